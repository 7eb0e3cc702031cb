use super::*;
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;
use std::time::Duration;

fn numeric_arg(matches: &clap::ArgMatches, name: &str) -> usize {
    let value = matches.value_of(name).unwrap_or("0");
    value
        .parse()
        .unwrap_or_else(|_| fail("simulate", format!("invalid --{} {:?}", name, value)))
}

pub async fn command_simulate(matches: &clap::ArgMatches<'_>) {
    let voters = numeric_arg(matches, "voters");
    let no_votes = numeric_arg(matches, "no-votes");
    let delegations = numeric_arg(matches, "delegations");
    let phase_gap = numeric_arg(matches, "phase-gap").max(1);

    if no_votes > voters {
        fail("simulate", "more no-votes than voters");
    }
    // Each delegation pairs two distinct voters
    if delegations * 2 > voters {
        fail("simulate", "each delegation needs two voters of its own");
    }

    // Admin, charity, then the voters
    let mut keys = KeyStore::default();
    let mut accounts = vec![];
    for _ in 0..voters + 2 {
        let credential = Credential::generate();
        accounts.push(credential.address());
        keys.insert(credential);
    }
    let roster = &accounts[2..];

    let delegations: IndexMap<Address, Address> = (0..delegations)
        .map(|i| (roster[2 * i], roster[2 * i + 1]))
        .collect();
    let no_votes: IndexSet<Address> = roster.iter().rev().take(no_votes).cloned().collect();
    for (delegator, delegatee) in delegations.iter() {
        println!("{} delegates to {}", delegator, delegatee);
    }

    let config = ElectionConfig {
        admin: accounts[0],
        charity: accounts[1],
        phase_gap: Duration::from_secs(phase_gap as u64),
        delegations,
        no_votes,
    };
    let expected_yes = roster
        .iter()
        .filter(|a| !config.no_votes.contains(*a))
        .count();

    let settings = RunSettings::from_env().unwrap_or_else(|e| fail("simulate", e));
    let ledger = Arc::new(MemLedger::new(config.admin));
    let ctx = ElectionContext::new(
        config,
        keys,
        settings,
        ledger.clone(),
        Arc::new(LocalCrypto),
    )
    .unwrap_or_else(|e| fail("simulate", e));
    let mut orchestrator = Orchestrator::new(ctx).unwrap_or_else(|e| fail("simulate", e));

    let summary = orchestrator.run().await;
    print_summary(&summary);
    println!(
        "> {} ledger calls, total gas used: {}",
        ledger.history().len(),
        orchestrator.context().audit.total_cost()
    );

    match summary.tally() {
        Some(tally) if tally.yes as usize == expected_yes && tally.total as usize == voters => {
            println!("> Tally matches the configured votes");
        }
        Some(tally) => fail(
            "simulate",
            format!(
                "tally {} does not match the {} configured yes votes",
                tally, expected_yes
            ),
        ),
        None => std::process::exit(1),
    }
}
