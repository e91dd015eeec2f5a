/// Display version information
pub fn execute() {
    println!("procura {}", env!("CARGO_PKG_VERSION"));
    println!("Replicated contract-approval ledger node");
}
