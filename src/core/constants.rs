use rust_decimal::Decimal;

// Exchange backend endpoints
pub const CHANGELLY_API_URL: &str = "https://swap.api.bitcore.io/changelly/v2";
pub const THORSWAP_API_URL: &str = "https://swap.api.bitcore.io/thorswap";
pub const ALLOWANCE_INDEXER_URL: &str = "https://deep-index.api.bitcore.io/erc20";

// Quote round timing
pub const QUOTE_DEBOUNCE_MS: u64 = 2000;
pub const ROUND_SETTLE_MS: u64 = 3500;

// Allowance confirmation polling
pub const ALLOWANCE_POLL_INTERVAL_MS: u64 = 3000;
pub const ALLOWANCE_MAX_POLL_ATTEMPTS: u32 = 100;
pub const ALLOWANCE_QUERY_RETRIES: u32 = 2;

// Slippage tolerance (percent)
lazy_static::lazy_static! {
    pub static ref THORSWAP_DEFAULT_SLIPPAGE: Decimal = Decimal::new(30, 1); // 3.0%
    pub static ref SLIPPAGE_MIN_LIMIT: Decimal = Decimal::new(5, 1); // 0.5%
    pub static ref SLIPPAGE_MAX_LIMIT: Decimal = Decimal::new(100, 1); // 10%
    pub static ref SLIPPAGE_STEP: Decimal = Decimal::new(5, 1);
}

// Chains whose tokens need an ERC-20 style spending approval
pub const EVM_CHAINS: &[&str] = &["eth", "matic", "arb", "base", "op"];

// Coins quotable through the Changelly-style backend
pub const CHANGELLY_SUPPORTED_COINS: &[&str] = &[
    "btc", "bch", "eth", "ltc", "doge", "xrp", "sol", "matic", "dai", "usdc", "usdt", "wbtc",
    "shib", "link", "uni",
];

// Native coins quotable through the THORSwap-style backend
pub const THORSWAP_SUPPORTED_COINS: &[&str] = &["btc", "bch", "eth", "doge", "ltc"];

// ERC-20 tokens on Ethereum quotable through the THORSwap-style backend
pub const THORSWAP_SUPPORTED_ETH_ERC20_TOKENS: &[&str] = &[
    "aave", "bal", "bat", "comp", "crv", "dai", "fox", "link", "matic", "mkr", "snx", "sushi",
    "uni", "usdc", "usdp", "usdt", "wbtc", "yfi", "zrx",
];

// ISO country codes each backend refuses to serve
pub const CHANGELLY_RESTRICTED_COUNTRIES: &[&str] = &["US"];
pub const THORSWAP_RESTRICTED_COUNTRIES: &[&str] = &[];
