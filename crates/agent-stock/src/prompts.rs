//! System prompt templates of the research nodes
//!
//! Templates are rendered with MiniJinja. The fan-out prompts take
//! `{{ today }}`, the conclusion prompt takes `{{ price_data }}`.

use chrono::NaiveDate;
use minijinja::{Environment, context};

use crate::error::Result;

const FUNDAMENTAL_SYSTEMS: &str = "fundamental_systems";
const EMOTIONAL_SYSTEMS: &str = "emotional_systems";
const CONCLUSION_SYSTEMS: &str = "conclusion_systems";

const FUNDAMENTAL_TEMPLATE: &str = r"你是一位资深的A股基本面研究员。今天是 {{ today }}。

请围绕用户给出的股票与问题，联网检索最新的公开信息，完成基本面分析：
1. 公司主营业务、行业地位与竞争格局
2. 最近一期及历史财务数据：营收、净利润、毛利率、现金流与负债
3. 估值水平（市盈率、市净率）与同行业对比
4. 近期公告、业绩预告与重大事项
5. 主要风险点

只使用可以核实的数据，注明数据所属的报告期。结论要具体，避免空泛表述。";

const EMOTIONAL_TEMPLATE: &str = r"你是一位专注市场情绪的A股研究员。今天是 {{ today }}。

请围绕用户给出的股票与问题，联网检索近期的新闻、研报观点、社区讨论与资金动向，完成情绪面分析：
1. 近期市场关注的热点事件及其影响方向
2. 机构与分析师观点的变化
3. 投资者情绪与讨论热度
4. 主力资金、北向资金等资金流向
5. 情绪面可能反转的信号

请区分事实与观点，并给出整体情绪判断（偏多、中性、偏空）。";

const CONCLUSION_TEMPLATE: &str = r"你是一位投资决策分析师。你将收到多位研究员对同一只股票的分析结论，格式为“节点名: 内容”。

以下是该股票最近的逐日行情描述：
{{ price_data }}
请综合研究员的基本面与情绪面结论，并结合上面的量价走势：
1. 归纳各方观点的一致与分歧
2. 判断当前量价结构所处的阶段
3. 给出明确的操作建议（买入、持有、观望、卖出）及依据
4. 列出需要持续跟踪的关键风险

输出要条理清晰，结论先行。";

/// Rendered system prompts of the research nodes
#[derive(Debug)]
pub struct Prompts {
    env: Environment<'static>,
}

impl Prompts {
    /// Load the built-in templates
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template(FUNDAMENTAL_SYSTEMS, FUNDAMENTAL_TEMPLATE)?;
        env.add_template(EMOTIONAL_SYSTEMS, EMOTIONAL_TEMPLATE)?;
        env.add_template(CONCLUSION_SYSTEMS, CONCLUSION_TEMPLATE)?;
        Ok(Self { env })
    }

    /// Fundamental analysis prompt for the given day
    pub fn fundamental(&self, today: NaiveDate) -> Result<String> {
        self.render_dated(FUNDAMENTAL_SYSTEMS, today)
    }

    /// Sentiment analysis prompt for the given day
    pub fn emotional(&self, today: NaiveDate) -> Result<String> {
        self.render_dated(EMOTIONAL_SYSTEMS, today)
    }

    /// Conclusion prompt around a price-bar description
    pub fn conclusion(&self, price_data: &str) -> Result<String> {
        let template = self.env.get_template(CONCLUSION_SYSTEMS)?;
        Ok(template.render(context! { price_data => price_data })?)
    }

    fn render_dated(&self, name: &str, today: NaiveDate) -> Result<String> {
        let template = self.env.get_template(name)?;
        let today = today.format("%Y-%m-%d").to_string();
        Ok(template.render(context! { today => today })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_today_rendered() {
        let prompts = Prompts::new().unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();

        assert!(prompts.fundamental(today).unwrap().contains("今天是 2025-03-07"));
        assert!(prompts.emotional(today).unwrap().contains("今天是 2025-03-07"));
    }

    #[test]
    fn test_price_data_inserted_verbatim() {
        let prompts = Prompts::new().unwrap();
        let rendered = prompts
            .conclusion("0. 2025-03-03：开盘 10.00 <基准>\n")
            .unwrap();

        assert!(rendered.contains("0. 2025-03-03：开盘 10.00 <基准>\n"));
        assert!(!rendered.contains("{{"));
    }
}
