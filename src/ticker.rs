//! Ticker Classifier
//!
//! Decides whether a query is about a tradable instrument and, if so, which one.
//! Precision first: a company name alone never resolves to a ticker, the query
//! must also carry market intent.
//!
//! GATE → DIRECT SYMBOL → ALIAS TABLE → NONE

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchanges a ticker may be listed on
pub const EXCHANGES: &[&str] = &["NYSE", "NASDAQ", "AMEX", "XETR", "HKEX"];

/// Canonical `EXCHANGE:SYMBOL` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn exchange(&self) -> &str {
        self.0.split_once(':').map(|(ex, _)| ex).unwrap_or("")
    }

    pub fn symbol(&self) -> &str {
        self.0.split_once(':').map(|(_, sym)| sym).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTicker(pub String);

impl fmt::Display for InvalidTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ticker: {}", self.0)
    }
}

impl std::error::Error for InvalidTicker {}

impl FromStr for Ticker {
    type Err = InvalidTicker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = TICKER_FORMAT
            .captures(s)
            .ok_or_else(|| InvalidTicker(s.to_string()))?;
        if !EXCHANGES.contains(&&caps[1]) {
            return Err(InvalidTicker(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Ticker {
    type Error = InvalidTicker;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ticker> for String {
    fn from(t: Ticker) -> Self {
        t.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Company alias → ticker. Several aliases may share one ticker.
const COMPANY_TICKERS: &[(&str, &str)] = &[
    // Tech
    ("apple", "NASDAQ:AAPL"),
    ("microsoft", "NASDAQ:MSFT"),
    ("google", "NASDAQ:GOOGL"),
    ("alphabet", "NASDAQ:GOOGL"),
    ("meta", "NASDAQ:META"),
    ("facebook", "NASDAQ:META"),
    ("tesla", "NASDAQ:TSLA"),
    ("nvidia", "NASDAQ:NVDA"),
    ("netflix", "NASDAQ:NFLX"),
    ("adobe", "NASDAQ:ADBE"),
    ("salesforce", "NYSE:CRM"),
    ("oracle", "NYSE:ORCL"),
    ("intel", "NASDAQ:INTC"),
    ("amd", "NASDAQ:AMD"),
    ("ibm", "NYSE:IBM"),
    ("cisco", "NASDAQ:CSCO"),
    ("uber", "NYSE:UBER"),
    ("airbnb", "NASDAQ:ABNB"),
    ("spotify", "NYSE:SPOT"),
    ("paypal", "NASDAQ:PYPL"),
    ("square", "NYSE:SQ"),
    ("block", "NYSE:SQ"),
    ("twitter", "NYSE:X"),
    ("snap", "NYSE:SNAP"),
    ("snapchat", "NYSE:SNAP"),
    ("zoom", "NASDAQ:ZM"),
    ("shopify", "NYSE:SHOP"),
    ("roblox", "NYSE:RBLX"),
    ("palantir", "NYSE:PLTR"),
    ("coinbase", "NASDAQ:COIN"),
    ("robinhood", "NASDAQ:HOOD"),
    ("doordash", "NASDAQ:DASH"),
    ("pinterest", "NYSE:PINS"),
    ("crowdstrike", "NASDAQ:CRWD"),
    ("datadog", "NASDAQ:DDOG"),
    ("snowflake", "NYSE:SNOW"),
    ("mongodb", "NASDAQ:MDB"),
    ("docusign", "NASDAQ:DOCU"),
    ("twilio", "NYSE:TWLO"),
    ("okta", "NASDAQ:OKTA"),
    ("dropbox", "NASDAQ:DBX"),
    // Finance
    ("jpmorgan", "NYSE:JPM"),
    ("jp morgan", "NYSE:JPM"),
    ("chase", "NYSE:JPM"),
    ("bank of america", "NYSE:BAC"),
    ("bofa", "NYSE:BAC"),
    ("wells fargo", "NYSE:WFC"),
    ("goldman sachs", "NYSE:GS"),
    ("goldman", "NYSE:GS"),
    ("morgan stanley", "NYSE:MS"),
    ("citi", "NYSE:C"),
    ("citigroup", "NYSE:C"),
    ("citibank", "NYSE:C"),
    ("american express", "NYSE:AXP"),
    ("amex", "NYSE:AXP"),
    ("visa", "NYSE:V"),
    ("mastercard", "NYSE:MA"),
    ("berkshire", "NYSE:BRK.A"),
    ("berkshire hathaway", "NYSE:BRK.A"),
    ("blackrock", "NYSE:BLK"),
    ("schwab", "NYSE:SCHW"),
    ("charles schwab", "NYSE:SCHW"),
    ("fidelity", "NYSE:FNF"),
    // Retail
    ("walmart", "NYSE:WMT"),
    ("amazon", "NASDAQ:AMZN"),
    ("home depot", "NYSE:HD"),
    ("costco", "NASDAQ:COST"),
    ("target", "NYSE:TGT"),
    ("lowes", "NYSE:LOW"),
    ("cvs", "NYSE:CVS"),
    ("walgreens", "NASDAQ:WBA"),
    ("kroger", "NYSE:KR"),
    ("best buy", "NYSE:BBY"),
    ("macys", "NYSE:M"),
    ("nordstrom", "NYSE:JWN"),
    ("gap", "NYSE:GPS"),
    ("nike", "NYSE:NKE"),
    ("adidas", "XETR:ADS"),
    ("lululemon", "NASDAQ:LULU"),
    ("starbucks", "NASDAQ:SBUX"),
    ("mcdonalds", "NYSE:MCD"),
    ("chipotle", "NYSE:CMG"),
    ("dominos", "NYSE:DPZ"),
    // Healthcare
    ("johnson & johnson", "NYSE:JNJ"),
    ("j&j", "NYSE:JNJ"),
    ("pfizer", "NYSE:PFE"),
    ("moderna", "NASDAQ:MRNA"),
    ("unitedhealth", "NYSE:UNH"),
    ("cvs health", "NYSE:CVS"),
    ("abbvie", "NYSE:ABBV"),
    ("merck", "NYSE:MRK"),
    ("eli lilly", "NYSE:LLY"),
    ("bristol myers", "NYSE:BMY"),
    ("bristol-myers", "NYSE:BMY"),
    ("abbott", "NYSE:ABT"),
    ("medtronic", "NYSE:MDT"),
    ("thermo fisher", "NYSE:TMO"),
    // Auto
    ("ford", "NYSE:F"),
    ("general motors", "NYSE:GM"),
    ("gm", "NYSE:GM"),
    ("toyota", "NYSE:TM"),
    ("honda", "NYSE:HMC"),
    ("volkswagen", "XETR:VOW3"),
    ("stellantis", "NYSE:STLA"),
    ("rivian", "NASDAQ:RIVN"),
    ("lucid", "NASDAQ:LCID"),
    ("nio", "NYSE:NIO"),
    ("byd", "HKEX:1211"),
    // Energy
    ("exxon", "NYSE:XOM"),
    ("exxonmobil", "NYSE:XOM"),
    ("chevron", "NYSE:CVX"),
    ("conocophillips", "NYSE:COP"),
    ("marathon", "NYSE:MPC"),
    ("valero", "NYSE:VLO"),
    ("occidental", "NYSE:OXY"),
    ("shell", "NYSE:SHEL"),
    ("bp", "NYSE:BP"),
    ("total", "NYSE:TTE"),
    ("totalenergies", "NYSE:TTE"),
    // Airlines
    ("delta", "NYSE:DAL"),
    ("united", "NASDAQ:UAL"),
    ("american airlines", "NASDAQ:AAL"),
    ("southwest", "NYSE:LUV"),
    ("jetblue", "NASDAQ:JBLU"),
    ("alaska", "NYSE:ALK"),
    ("spirit", "NYSE:SAVE"),
    // Entertainment
    ("disney", "NYSE:DIS"),
    ("walt disney", "NYSE:DIS"),
    ("warner bros", "NASDAQ:WBD"),
    ("paramount", "NASDAQ:PARA"),
    ("comcast", "NASDAQ:CMCSA"),
    ("roku", "NASDAQ:ROKU"),
    ("amc", "NYSE:AMC"),
    // Crypto-adjacent
    ("microstrategy", "NASDAQ:MSTR"),
    ("marathon digital", "NASDAQ:MARA"),
    ("riot", "NASDAQ:RIOT"),
    ("riot platforms", "NASDAQ:RIOT"),
    ("hut 8", "NASDAQ:HUT"),
    ("cleanspark", "NASDAQ:CLSK"),
    // Other majors
    ("coca cola", "NYSE:KO"),
    ("coca-cola", "NYSE:KO"),
    ("coke", "NYSE:KO"),
    ("pepsi", "NASDAQ:PEP"),
    ("pepsico", "NASDAQ:PEP"),
    ("procter & gamble", "NYSE:PG"),
    ("p&g", "NYSE:PG"),
    ("3m", "NYSE:MMM"),
    ("boeing", "NYSE:BA"),
    ("lockheed", "NYSE:LMT"),
    ("lockheed martin", "NYSE:LMT"),
    ("raytheon", "NYSE:RTX"),
    ("northrop", "NYSE:NOC"),
    ("northrop grumman", "NYSE:NOC"),
    ("general electric", "NYSE:GE"),
    ("ge", "NYSE:GE"),
    ("caterpillar", "NYSE:CAT"),
    ("deere", "NYSE:DE"),
    ("john deere", "NYSE:DE"),
    ("ups", "NYSE:UPS"),
    ("fedex", "NYSE:FDX"),
    ("verizon", "NYSE:VZ"),
    ("at&t", "NYSE:T"),
    ("att", "NYSE:T"),
    ("t-mobile", "NASDAQ:TMUS"),
    ("tmobile", "NASDAQ:TMUS"),
];

struct CompiledAlias {
    pattern: Regex,
    ticker: &'static str,
}

lazy_static! {
    static ref TICKER_FORMAT: Regex =
        Regex::new(r"^([A-Z]+):([A-Z0-9.]{1,5})$").expect("ticker format regex");

    /// Market-intent lexicon, matched on word boundaries ("$" and "p/e" are symbolic).
    static ref MARKET_KEYWORDS: Regex = Regex::new(
        r"(?i)\b(stocks?|shares?|prices?|markets?|trading|trades?|invest(s|ing|ors?|ments?)?|tickers?|charts?|technical analysis|market cap|valuations?|earnings|revenues?|profits?|loss(es)?|dividends?|performance|quotes?|nasdaq|nyse|doing|up|down)\b|\$|\bp/e\b"
    )
    .expect("market keyword regex");

    static ref MARKET_PATTERNS: [Regex; 3] = [
        Regex::new(r"(?i)how\s+is\s+\w+\s+doing").expect("intent regex"),
        Regex::new(r"(?i)what('s|\s+is)\s+\w+\s+stock").expect("intent regex"),
        Regex::new(r"\$[A-Z]+").expect("intent regex"),
    ];

    static ref CASHTAG: Regex = Regex::new(r"\$([A-Z]{1,5})\b").expect("cashtag regex");

    /// Symbol must be written in capitals; the trailing noun may be any case.
    static ref SYMBOL_NOUN: Regex =
        Regex::new(r"\b([A-Z]{1,5})\s+(?i:stocks?|shares?|prices?|charts?)\b").expect("symbol regex");

    static ref EXCHANGE_SYMBOL: Regex = Regex::new(&format!(
        r"(?i)\b({}):([A-Z0-9.]{{1,5}})\b",
        EXCHANGES.join("|")
    ))
    .expect("exchange regex");

    /// Alias table sorted by alias length, longest first; ties keep table order.
    static ref SORTED_ALIASES: Vec<CompiledAlias> = {
        let mut entries: Vec<&(&str, &str)> = COMPANY_TICKERS.iter().collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        entries
            .into_iter()
            .map(|(alias, ticker)| CompiledAlias {
                pattern: Regex::new(&format!(r"(?i)\b{}\b", regex::escape(alias)))
                    .expect("alias regex"),
                ticker,
            })
            .collect()
    };
}

/// Resolve the instrument a query refers to, if it has market intent.
pub fn detect(text: &str) -> Option<Ticker> {
    if !has_market_intent(text) {
        return None;
    }

    direct_symbol(text)
        .or_else(|| alias_lookup(text))
        .and_then(|raw| raw.parse().ok())
}

/// Gate: lexicon keyword or intent pattern
pub fn has_market_intent(text: &str) -> bool {
    MARKET_KEYWORDS.is_match(text) || MARKET_PATTERNS.iter().any(|p| p.is_match(text))
}

/// `$SYMBOL`, then `SYMBOL stock|share|price|chart`, then `EXCHANGE:SYMBOL`
fn direct_symbol(text: &str) -> Option<String> {
    for pattern in [&*CASHTAG, &*SYMBOL_NOUN] {
        if let Some(caps) = pattern.captures(text) {
            if let Some(known) = known_ticker_for(&caps[1]) {
                return Some(known.to_string());
            }
        }
    }

    EXCHANGE_SYMBOL.captures(text).and_then(|caps| {
        let candidate = format!(
            "{}:{}",
            caps[1].to_ascii_uppercase(),
            caps[2].to_ascii_uppercase()
        );
        candidate.parse::<Ticker>().ok().map(String::from)
    })
}

/// Accept a bare symbol only if the alias table knows it. Exact symbol wins;
/// otherwise a symbol of two or more characters may match inside a known one.
fn known_ticker_for(symbol: &str) -> Option<&'static str> {
    let symbol = symbol.to_ascii_uppercase();
    let tickers = || COMPANY_TICKERS.iter().map(|(_, ticker)| *ticker);

    tickers()
        .find(|t| symbol_part(t) == symbol)
        .or_else(|| {
            if symbol.len() < 2 {
                return None;
            }
            tickers().find(|t| symbol_part(t).contains(symbol.as_str()))
        })
}

fn symbol_part(ticker: &str) -> &str {
    ticker.split_once(':').map(|(_, sym)| sym).unwrap_or(ticker)
}

fn alias_lookup(text: &str) -> Option<String> {
    SORTED_ALIASES
        .iter()
        .find(|a| a.pattern.is_match(text))
        .map(|a| a.ticker.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_str(text: &str) -> Option<String> {
        detect(text).map(String::from)
    }

    #[test]
    fn test_no_market_intent_returns_none() {
        let cases = vec![
            "Tell me about Apple's founding history",
            "What is the capital of France?",
            "Who founded Microsoft?",
            "Best pizza near Target Field",
        ];

        for c in cases {
            assert_eq!(detect_str(c), None, "expected no ticker for {:?}", c);
        }
    }

    #[test]
    fn test_company_with_market_intent() {
        assert_eq!(
            detect_str("How is Tesla stock doing today?").as_deref(),
            Some("NASDAQ:TSLA")
        );
        assert_eq!(
            detect_str("apple share price").as_deref(),
            Some("NASDAQ:AAPL")
        );
        assert_eq!(
            detect_str("Coca-Cola dividend history").as_deref(),
            Some("NYSE:KO")
        );
    }

    #[test]
    fn test_longest_alias_wins() {
        assert_eq!(
            detect_str("bank of america earnings").as_deref(),
            Some("NYSE:BAC")
        );
        assert_eq!(
            detect_str("marathon digital stock").as_deref(),
            Some("NASDAQ:MARA")
        );
    }

    #[test]
    fn test_punctuated_aliases() {
        assert_eq!(detect_str("AT&T dividend yield").as_deref(), Some("NYSE:T"));
        assert_eq!(detect_str("p&g earnings call").as_deref(), Some("NYSE:PG"));
        assert_eq!(detect_str("T-Mobile stock").as_deref(), Some("NASDAQ:TMUS"));
    }

    #[test]
    fn test_direct_symbols() {
        assert_eq!(detect_str("thoughts on $NVDA?").as_deref(), Some("NASDAQ:NVDA"));
        assert_eq!(detect_str("AMD stock forecast").as_deref(), Some("NASDAQ:AMD"));
        assert_eq!(
            detect_str("chart for nasdaq:aapl please").as_deref(),
            Some("NASDAQ:AAPL")
        );
    }

    #[test]
    fn test_unknown_symbols_rejected() {
        // capitalised word that is not a known symbol, no alias either
        assert_eq!(detect_str("ZZZZ stock"), None);
        // lowercase word before "stock" is not a symbol candidate
        assert_eq!(detect_str("is this a good stock"), None);
    }

    #[test]
    fn test_word_boundaries() {
        // "ge" inside "change" and "gm" inside "segment" must not match
        assert_eq!(detect_str("how does a price change segment work"), None);
    }

    #[test]
    fn test_alias_table_is_well_formed() {
        for (alias, ticker) in COMPANY_TICKERS {
            assert_eq!(*alias, alias.to_lowercase(), "alias must be lowercase");
            assert!(
                ticker.parse::<Ticker>().is_ok(),
                "table value {} is not a valid ticker",
                ticker
            );
            assert!(alias.len() > 1, "single-letter alias {} matches ordinary words", alias);
        }
    }

    #[test]
    fn test_ticker_parse() {
        let t: Ticker = "NYSE:BRK.A".parse().unwrap();
        assert_eq!(t.exchange(), "NYSE");
        assert_eq!(t.symbol(), "BRK.A");
        assert!("LSE:VOD".parse::<Ticker>().is_err());
        assert!("NYSE:TOOLONG".parse::<Ticker>().is_err());
        assert!("nyse:ibm".parse::<Ticker>().is_err());
    }
}
