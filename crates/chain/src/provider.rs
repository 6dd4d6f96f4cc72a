use alloy::providers::RootProvider;

/// The JSON-RPC provider type used throughout the application.
///
/// The indexer only reads (`eth_blockNumber`, `eth_getLogs`,
/// `eth_getBlockByNumber`), so no transaction fillers are layered on.
pub type ChainProvider = RootProvider;

/// Create an HTTP provider from an RPC URL string.
pub fn create_provider(rpc_url: &str) -> eyre::Result<ChainProvider> {
    let url = rpc_url.parse()?;
    Ok(RootProvider::new_http(url))
}
