use procura::node::NetworkHealth;
use std::time::Duration;

/// Check a running node's health
///
/// Fetches `/api/health` from the node at `url` and prints:
/// - Node id and advertised address
/// - Ledger height, tip hash and chain validity
/// - Contract counts by status
/// - Peer liveness
pub async fn execute(url: String) -> Result<(), Box<dyn std::error::Error>> {
    let health = fetch_health(&url).await?;
    print!("{}", render(&health));
    Ok(())
}

async fn fetch_health(url: &str) -> Result<NetworkHealth, Box<dyn std::error::Error>> {
    let endpoint = format!("{}/api/health", url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let response = client
        .get(&endpoint)
        .send()
        .await
        .map_err(|e| format!("Failed to reach node at {}: {}", url, e))?;
    if !response.status().is_success() {
        return Err(format!("Node responded with status {}", response.status()).into());
    }

    Ok(response.json().await?)
}

fn render(health: &NetworkHealth) -> String {
    let mark = |ok: bool| if ok { "✅" } else { "❌" };
    let ledger = &health.ledger;
    let mut out = String::new();

    out.push_str("📊 Procura Node Status\n\n");
    out.push_str(&format!("  Node: {} ({})\n", health.node_id, health.address));
    out.push_str(&format!(
        "  {} Chain: height {}, valid: {}\n",
        mark(ledger.chain_valid),
        ledger.height,
        ledger.chain_valid
    ));
    out.push_str(&format!("  Tip: {}\n", ledger.last_block_hash));
    out.push_str(&format!(
        "  {} Synced: {}\n",
        mark(ledger.is_synced),
        ledger.is_synced
    ));
    out.push_str(&format!(
        "  Registry: {}\n",
        if health.registry_enabled {
            "enabled"
        } else {
            "bootstrap only"
        }
    ));
    out.push('\n');

    out.push_str(&format!("  Contracts: {}\n", ledger.total_contracts));
    for (status, count) in &ledger.contract_status_counts {
        out.push_str(&format!("    {}: {}\n", status, count));
    }
    out.push('\n');

    out.push_str(&format!(
        "  Peers: {} active / {} known\n",
        health.active_peers, health.total_peers
    ));
    for peer in &health.peers {
        out.push_str(&format!(
            "    {} {} {}:{}\n",
            mark(peer.active),
            peer.id,
            peer.address,
            peer.port
        ));
    }
    out
}
