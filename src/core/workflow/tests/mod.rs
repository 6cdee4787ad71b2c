mod backoff;
mod job_lifecycle;
mod single_flight;
mod sse_decode;
