//! Static stock metadata used for search keywords and report headers.
//!
//! A real deployment would back this with a reference-data service; the
//! pipeline only needs a name and an industry tag for the symbols it is
//! commonly asked about, with a sane default for everything else.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockInfo {
    pub symbol: String,
    pub name: String,
    pub industry: String,
    pub area: String,
}

const KNOWN: &[(&str, &str, &str, &str)] = &[
    ("300663", "科蓝软件", "软件开发", "北京"),
    ("000001", "平安银行", "银行", "深圳"),
    ("600036", "招商银行", "银行", "深圳"),
    ("000858", "五粮液", "白酒", "四川"),
    ("601127", "小康股份", "汽车制造", "重庆"),
    ("002415", "海康威视", "电子制造", "浙江"),
    ("000002", "万科A", "房地产", "深圳"),
    ("600519", "贵州茅台", "白酒", "贵州"),
    ("601318", "中国平安", "保险", "深圳"),
    ("000333", "美的集团", "家电制造", "广东"),
];

/// Metadata for a (normalized) symbol; unknown symbols get a generic entry.
pub fn stock_info(symbol: &str) -> StockInfo {
    let code = crate::sources::normalize_symbol(symbol);
    for (sym, name, industry, area) in KNOWN {
        if *sym == code {
            return StockInfo {
                symbol: code,
                name: (*name).to_string(),
                industry: (*industry).to_string(),
                area: (*area).to_string(),
            };
        }
    }
    StockInfo {
        symbol: code.clone(),
        name: format!("{code}股票"),
        industry: "综合行业".to_string(),
        area: "未知地区".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_symbol_resolves() {
        let info = stock_info("300663");
        assert_eq!(info.name, "科蓝软件");
        assert_eq!(info.industry, "软件开发");
    }

    #[test]
    fn unknown_symbol_gets_generic_entry() {
        let info = stock_info("999999");
        assert_eq!(info.name, "999999股票");
        assert_eq!(info.industry, "综合行业");
    }

    #[test]
    fn suffixed_symbol_is_normalized_first() {
        assert_eq!(stock_info("000001.SZ").name, "平安银行");
    }
}
