use super::*;

pub async fn command_status(_matches: &clap::ArgMatches<'_>, uri: &str, contract: Option<&str>) {
    let contract = require_contract("status", contract);
    let ledger = RestLedger::new(uri, contract);

    let state = ledger
        .state()
        .await
        .unwrap_or_else(|e| fail("status", e));
    let counters = ledger
        .counters()
        .await
        .unwrap_or_else(|e| fail("status", e));

    println!("contract: {}", contract);
    println!("state: {}", state);
    println!("progress: {}", counters);

    if state != Phase::Setup {
        match ledger.deadlines().await {
            Ok(deadlines) => {
                println!("registration closes: {}", deadlines.voters_finish_signup);
                println!("sign-up ends: {}", deadlines.end_signup);
                println!("commitment ends: {}", deadlines.end_commitment);
                println!("voting ends: {}", deadlines.end_voting);
                println!("refunds end: {}", deadlines.end_refund);
            }
            Err(e) => warn!("unable to read deadlines: {}", e),
        }
    }

    if state == Phase::Finished {
        let yes = ledger.final_tally(0).await;
        let total = ledger.final_tally(1).await;
        match (yes, total) {
            (Ok(yes), Ok(total)) => println!("result: {}", TallyResult { yes, total }),
            (Err(e), _) | (_, Err(e)) => fail("status", e),
        }
    }
}
