use super::*;
use std::sync::Arc;

pub async fn command_run(matches: &clap::ArgMatches<'_>, uri: &str, contract: Option<&str>) {
    let contract = require_contract("run", contract);

    let keys_file = expand(matches.value_of("KEYS").unwrap_or_default());
    let keys = KeyStore::from_file(&keys_file).unwrap_or_else(|e| fail("run", e));

    let config_file = expand(matches.value_of("CONFIG").unwrap_or_default());
    let config = ElectionConfig::from_file(&config_file, &keys).unwrap_or_else(|e| fail("run", e));

    let settings = RunSettings::from_env().unwrap_or_else(|e| fail("run", e));

    let ledger = Arc::new(RestLedger::new(uri, contract));
    let ctx = ElectionContext::new(config, keys, settings, ledger, Arc::new(LocalCrypto))
        .unwrap_or_else(|e| fail("run", e));
    let mut orchestrator = Orchestrator::new(ctx).unwrap_or_else(|e| fail("run", e));

    info!(
        "running election on {} with {} voters",
        contract,
        orchestrator.context().registry.len()
    );
    let summary = orchestrator.run().await;
    print_summary(&summary);

    if !summary.is_success() {
        std::process::exit(1);
    }
}
