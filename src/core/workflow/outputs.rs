use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const MARKET_SENTIMENT_INIT: &str = "市场情绪分析初始化";
pub const RISK_APPRAISAL: &str = "用户风险评价工作流";
pub const FUND_RECOMMENDATION: &str = "给出所选行业的基金推荐";

/// Top-level fields that mark an object as a sentiment result.
const SENTIMENT_FIELDS: [&str; 5] = [
    "total_score",
    "news_lists",
    "news_reports",
    "index",
    "industry_emo",
];

/// Result fields the risk-appraisal stream delivers one at a time.
pub const RISK_STREAM_FIELDS: [&str; 5] =
    ["invest_summary", "risk_summary", "score", "fund", "news"];

/// Build the engine inputs for a workflow from the caller's payload.
/// The sentiment init takes no inputs; the risk appraisal gets a default
/// allocation and industry when the caller omits them.
pub fn shape_inputs(workflow: &str, payload: Option<&Value>) -> Value {
    match workflow {
        MARKET_SENTIMENT_INIT => json!({}),
        RISK_APPRAISAL => {
            let fund = payload
                .and_then(|p| p.get("fund"))
                .filter(|f| f.is_array())
                .cloned()
                .unwrap_or_else(default_fund_allocation);
            let industry = payload
                .and_then(|p| p.get("industry"))
                .and_then(Value::as_str)
                .unwrap_or("我关注半导体行业");
            json!({ "fund": fund, "industry": industry })
        }
        _ => payload.cloned().unwrap_or_else(|| json!({})),
    }
}

fn default_fund_allocation() -> Value {
    json!([
        { "category": "债券基金", "percentage": 50 },
        { "category": "股票基金", "percentage": 10 },
        { "category": "货币基金", "percentage": 40 }
    ])
}

/// Dig the actual workflow outputs out of the engine's wrapper layers.
///
/// Breadth-first through `data` / `response` envelopes; the first array, the
/// first `outputs` / `result` object, or the first object carrying a known
/// sentiment field wins. Falls back to the payload itself.
pub fn extract_outputs(payload: &Value) -> Value {
    let mut queue: VecDeque<&Value> = VecDeque::from([payload]);
    while let Some(current) = queue.pop_front() {
        if current.is_array() {
            return current.clone();
        }
        let Some(obj) = current.as_object() else {
            continue;
        };
        if let Some(outputs) = obj.get("outputs").filter(|v| v.is_object()) {
            return outputs.clone();
        }
        if let Some(result) = obj.get("result").filter(|v| v.is_object()) {
            return result.clone();
        }
        if looks_like_sentiment_result(current) {
            return current.clone();
        }
        for key in ["data", "response"] {
            if let Some(inner) = obj.get(key).filter(|v| v.is_object()) {
                queue.push_back(inner);
            }
        }
    }
    payload.clone()
}

/// Outputs carried by one streaming event frame, if any. Streaming events
/// only wrap their outputs one level deep.
pub fn frame_outputs(frame: &Value) -> Option<&Value> {
    frame
        .get("data")
        .and_then(|d| d.get("outputs"))
        .filter(|v| v.is_object())
        .or_else(|| frame.get("outputs").filter(|v| v.is_object()))
}

pub fn looks_like_sentiment_result(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    SENTIMENT_FIELDS.iter().any(|field| {
        obj.get(*field)
            .is_some_and(|v| *field == "total_score" || v.is_array())
    })
}

/// Fund allocation as it appears on the wire: the current
/// `{category, percentage}` shape or the legacy `{asset, ratio}` one.
/// Normalized to [`FundSlice`] as soon as external data enters the system.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FundSliceWire {
    Current { category: String, percentage: f64 },
    Legacy { asset: String, ratio: f64 },
}

/// Canonical internal shape for one slice of a fund allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundSlice {
    pub category: String,
    pub percentage: f64,
}

impl From<FundSliceWire> for FundSlice {
    fn from(wire: FundSliceWire) -> Self {
        match wire {
            FundSliceWire::Current {
                category,
                percentage,
            } => FundSlice {
                category,
                percentage,
            },
            FundSliceWire::Legacy { asset, ratio } => FundSlice {
                category: asset,
                percentage: ratio,
            },
        }
    }
}

/// Parse a fund allocation in either wire shape. `None` when the value is
/// not a recognizable allocation list.
pub fn normalize_fund_slices(value: &Value) -> Option<Vec<FundSlice>> {
    serde_json::from_value::<Vec<FundSliceWire>>(value.clone())
        .ok()
        .map(|slices| slices.into_iter().map(FundSlice::from).collect())
}
