use serde_json::{Value, json};

use crate::core::error::{WorkflowError, WorkflowResult};

use super::outputs::{FUND_RECOMMENDATION, MARKET_SENTIMENT_INIT, RISK_APPRAISAL};

/// Canned workflow results for when no backend is configured, and for the
/// façade's fallback on non-timeout failures. Shapes mirror the real engine
/// outputs so downstream rendering code cannot tell the difference.
pub fn invoke(workflow: &str, payload: Option<&Value>) -> WorkflowResult<Value> {
    match workflow {
        MARKET_SENTIMENT_INIT => Ok(market_sentiment_init()),
        RISK_APPRAISAL => Ok(risk_appraisal()),
        FUND_RECOMMENDATION => Ok(fund_recommendation(payload)),
        other => Err(WorkflowError::Config(format!(
            "未配置的工作流：{other}"
        ))),
    }
}

pub fn market_sentiment_init() -> Value {
    json!({
        "total_score": 52,
        "positive": 30,
        "neutral": 40,
        "negative": 30,
        "detail_analysis": "当前市场正处于科技与消费双主线的强劲驱动之下，整体情绪维持偏暖态势。短期扰动主要来自储能与半导体产业链的阶段性波动，但并未改变长期向好趋势。",
        "analysis": "### 当前中国整体市场情绪得分分析\n\n基于今日市场数据，整体情绪得分52分，处于中性偏暖区间。科技与消费双主线协同发力，为市场提供上行动能。",
        "news_reports": [
            {
                "news": {
                    "title": "AI驱动机构调研聚焦新能源供应链",
                    "summary": "新能源产业链订单回暖，机构强调智能制造与绿色金融融合。",
                    "analysis": "订单回暖预计将推动相关板块估值修复。",
                    "label": "新能源产业链"
                }
            },
            {
                "news": {
                    "title": "算力中心扩容提速 AI基础设施需求爆发",
                    "summary": "多地出台算力扩容规划，液冷与GPU芯片企业迎来业绩弹性。",
                    "analysis": "建议关注中游设备商与相关龙头企业。",
                    "label": "算力基础设施"
                }
            }
        ],
        "index": [
            { "industryName": "上证指数", "point": -0.2 },
            { "industryName": "深证成指", "point": 0.3 },
            { "industryName": "创业板指", "point": 0.5 },
            { "industryName": "沪深300", "point": 0.1 }
        ],
        "industry_news_summary": "受科技与消费双主线驱动，市场情绪整体偏暖，短期波动来自储能与半导体链条扰动。",
        "industry_news": [
            {
                "title": "智能驾驶政策窗口打开",
                "sector": "汽车电子",
                "analysis": "政策明确高级辅助驾驶补贴细则，汽车电子链条订单显著回升。"
            },
            {
                "title": "绿色能源海外签约激增",
                "sector": "新能源出海",
                "analysis": "储能与风电企业获得大额长单，关注兑现节奏。"
            }
        ],
        "industry_emo_score": {
            "新能源": 3.2,
            "先进制造": 2.1,
            "金融": 1.2,
            "消费": 0.9,
            "医药": -1.4,
            "TMT": 2.6
        },
        "industry_emo_interpret": {
            "新能源": "政策催化与资金流向共同发力，建议关注具备估值弹性的龙头。",
            "先进制造": "智能制造与绿色金融融合推动估值修复。",
            "金融": "监管政策影响短期波动，长期看好。",
            "消费": "可选消费需求逐步释放，必选消费稳健托底。",
            "医药": "政策不确定性影响短期表现。",
            "TMT": "AI应用场景持续拓展，算力基础设施需求增长。"
        }
    })
}

pub fn risk_appraisal() -> Value {
    json!({
        "invest_summary": "当前持仓以债券与货币基金为主，权益敞口较低，组合整体波动可控。",
        "risk_summary": "风险偏好评估为稳健型。关注的半导体行业波动较大，建议控制单一行业集中度。",
        "score": 55,
        "fund": [
            { "category": "债券基金", "percentage": 50 },
            { "category": "股票基金", "percentage": 10 },
            { "category": "货币基金", "percentage": 40 }
        ],
        "news": [
            {
                "title": "半导体设备国产化率持续提升",
                "summary": "中游设备商订单兑现加快，行业景气度回升。"
            }
        ]
    })
}

fn fund_recommendation(payload: Option<&Value>) -> Value {
    let funds = json!([
        {
            "name": "科创成长先锋A",
            "return1Y": 18.6,
            "manager": "李晨",
            "info": "聚焦半导体、智能制造与算力基础设施，AI 动态调仓增强收益。",
            "focus": "先进制造"
        },
        {
            "name": "新能源双碳精选",
            "return1Y": 22.4,
            "manager": "陈思",
            "info": "覆盖光伏、储能、整车全链条，评估政策情绪与订单兑现节奏。",
            "focus": "新能源"
        },
        {
            "name": "全球创新科技QDII",
            "return1Y": 15.1,
            "manager": "王悦",
            "info": "全球 AI 与硬科技资产组合，强化风险对冲与货币敞口管理。",
            "focus": "TMT"
        },
        {
            "name": "医药健康平衡",
            "return1Y": 11.3,
            "manager": "周晗",
            "info": "精选创新药、医疗器械龙头，关注政策催化节点与估值修复。",
            "focus": "医药"
        }
    ]);

    let target = payload
        .and_then(|p| p.get("industry"))
        .and_then(Value::as_str);
    let all = funds.as_array().cloned().unwrap_or_default();
    let matched: Vec<Value> = match target {
        Some(industry) => all
            .iter()
            .filter(|fund| fund.get("focus").and_then(Value::as_str) == Some(industry))
            .cloned()
            .collect(),
        None => all.clone(),
    };
    if matched.is_empty() {
        Value::Array(all.into_iter().take(3).collect())
    } else {
        Value::Array(matched)
    }
}
