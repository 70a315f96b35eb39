pub mod records;
pub mod report;

use log::{error, info, warn};
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::modules::config::FailurePolicy;
use crate::modules::reset::{
    Account, AccountResetOrchestrator, Collaborators, OutcomeReport, OutcomeStatus, ResetOptions,
};
use crate::modules::store::{ResultReconciler, StoreError};

pub use records::{init_record, record_status, RecordSummary};
pub use report::RunReport;

/// How a run schedules its accounts
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub options: ResetOptions,
    pub policy: FailurePolicy,
    /// Upper bound on concurrent sessions
    pub workers: usize,
}

#[derive(Default)]
struct Shared {
    results: Vec<(usize, OutcomeReport)>,
    aborted: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reset every account, at most `plan.workers` at a time.
///
/// Each worker pulls the next account from a shared queue and owns that
/// account's session start to finish, including the store write. A failed
/// account stops the queue under `FailurePolicy::Stop`; an interrupt or an
/// unreachable store stops it regardless.
pub fn run_accounts(accounts: &[Account], plan: &RunPlan, deps: Collaborators<'_>) -> RunReport {
    let queue: Mutex<VecDeque<(usize, &Account)>> =
        Mutex::new(accounts.iter().enumerate().collect());
    let shared = Mutex::new(Shared::default());
    let stop = AtomicBool::new(false);
    let workers = plan.workers.clamp(1, accounts.len().max(1));

    info!(
        "Resetting {} account(s) with {} worker(s)",
        accounts.len(),
        workers
    );

    thread::scope(|scope| {
        for worker in 0..workers {
            let (queue, shared, stop) = (&queue, &shared, &stop);
            scope.spawn(move || loop {
                if stop.load(Ordering::SeqCst) || deps.interrupted.load(Ordering::SeqCst) {
                    break;
                }
                let next = lock(queue).pop_front();
                let (index, account) = match next {
                    Some(next) => next,
                    None => break,
                };

                info!("[worker {}] starting {}", worker, account.name);
                match run_one(account, plan, deps) {
                    Ok(report) => {
                        if report.status == OutcomeStatus::Failed
                            && plan.policy == FailurePolicy::Stop
                        {
                            warn!("{} failed, not starting further accounts", account.name);
                            stop.store(true, Ordering::SeqCst);
                        }
                        lock(shared).results.push((index, report));
                    }
                    Err((report, e)) => {
                        error!("Aborting run: {}", e);
                        stop.store(true, Ordering::SeqCst);
                        let mut shared = lock(shared);
                        if let Some(report) = report {
                            shared.results.push((index, report));
                        }
                        shared.aborted.get_or_insert_with(|| e.to_string());
                    }
                }
            });
        }
    });

    let mut shared = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
    shared.results.sort_by_key(|(index, _)| *index);
    let not_started = queue
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .map(|(_, account)| account.name.clone())
        .collect();

    RunReport {
        results: shared.results.into_iter().map(|(_, report)| report).collect(),
        not_started,
        aborted: shared.aborted,
    }
}

/// Reset one account and persist the outcome
fn run_one(
    account: &Account,
    plan: &RunPlan,
    deps: Collaborators<'_>,
) -> Result<OutcomeReport, (Option<OutcomeReport>, StoreError)> {
    let orchestrator = AccountResetOrchestrator::new(account.clone(), &plan.options, deps);
    let outcome = orchestrator.run().map_err(|e| (None, e))?;
    let mut report = outcome.report();

    if let Err(e) = ResultReconciler::new(deps.store).reconcile(&outcome) {
        if outcome.status == OutcomeStatus::Succeeded {
            error!(
                "[{}] password was changed but could not be stored: {}",
                account.name, e
            );
            report.reason = format!(
                "password changed but not stored ({}); new password printed to stderr, \
                 rerun with --force-reset once the store is reachable",
                e
            );
            if let Some(credential) = &outcome.credential {
                hand_over_unstored(account, credential);
            }
        }
        return Err((Some(report), e));
    }

    match serde_json::to_string(&report) {
        Ok(line) => info!("result {}", line),
        Err(e) => warn!("[{}] could not serialize result: {}", account.name, e),
    }
    Ok(report)
}

/// Print a credential the store refused, once, on stderr only
fn hand_over_unstored(account: &Account, credential: &SecretString) {
    let notice = format!(
        "\nWARNING: root password for {} ({}) was changed but could not be stored.\n\
         New password: {}\n\
         It is not written to the log or the run output. Save it now.\n",
        account.name,
        account.account_id,
        credential.expose_secret()
    );
    if let Err(e) = io::stderr().lock().write_all(notice.as_bytes()) {
        error!("[{}] could not print the unstored password: {}", account.name, e);
    }
}
