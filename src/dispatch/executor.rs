//! Rate-limited parallel dispatch.
//!
//! A pool of `rate` workers sends the requests; each worker waits `1/rate`
//! seconds before every real request. Failures are logged and counted, the
//! batch always runs to the end.
//!
//! Requests for the same stanza form one work unit and run in plan order on a
//! single worker, so an ACL update never reaches the server before the object
//! it applies to has been created.

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use indexmap::IndexMap;
use indicatif::ProgressBar;
use rayon::prelude::*;
use stanzakit::{DispatchRequest, IdempotencyKey, RequestKind};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::transport::Transport;
use crate::logging::DUMMY_TARGET;
use crate::progress;

/// Settings for one dispatch batch.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// API base URL, no trailing slash
    pub base_url: String,
    /// Bearer token
    pub token: String,
    /// Worker count and per-worker request rate
    pub rate: u32,
    /// Draw a progress bar
    pub show_progress: bool,
}

impl ExecuteOptions {
    fn delay(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate.max(1)))
    }
}

/// A request that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub key: IdempotencyKey,
    pub kind: RequestKind,
    pub reason: String,
}

/// Counts for a dispatch batch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub dummy: usize,
    pub failures: Vec<Failure>,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.dummy
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug)]
enum Outcome {
    Succeeded,
    Dummy,
    Failed(Failure),
}

/// Numbered status lines shared by the workers.
struct ProgressSink {
    pb: ProgressBar,
    count: Mutex<usize>,
}

impl ProgressSink {
    fn record(&self, outcome: &Outcome, elapsed: Duration) {
        let mut count = match self.count.lock() {
            Ok(count) => count,
            Err(poisoned) => poisoned.into_inner(),
        };
        *count += 1;

        let line = match outcome {
            Outcome::Succeeded => format!(
                "#{} | {} in {:.2} seconds",
                *count,
                "API call successful".green(),
                elapsed.as_secs_f64()
            ),
            Outcome::Dummy => format!("#{} | {}", *count, "Dummy API call successful".cyan()),
            Outcome::Failed(_) => format!(
                "#{} | {}, see error.log for details",
                *count,
                "API call failed".red()
            ),
        };
        if self.pb.is_hidden() {
            log::debug!("{line}");
        } else {
            self.pb.println(line);
        }
        self.pb.inc(1);
    }
}

/// Send every request and report the outcome.
pub fn execute(
    requests: &[DispatchRequest],
    transport: &dyn Transport,
    opts: &ExecuteOptions,
) -> Result<DispatchReport> {
    if requests.is_empty() {
        return Ok(DispatchReport::default());
    }

    let len = requests.len() as u64;
    let sink = ProgressSink {
        pb: if opts.show_progress {
            progress::bar(len, "Dispatching")
        } else {
            progress::hidden(len)
        },
        count: Mutex::new(0),
    };
    let results: Arc<Mutex<Vec<Outcome>>> = Arc::new(Mutex::new(Vec::new()));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.rate.max(1) as usize)
        .build()
        .context("Failed to create dispatch thread pool")?;

    let units = work_units(requests);
    pool.install(|| {
        units.par_iter().for_each(|unit| {
            for request in unit {
                let started = Instant::now();
                let outcome = dispatch_one(request, transport, opts);
                sink.record(&outcome, started.elapsed());
                push_outcome(&results, outcome);
            }
        });
    });

    sink.pb.finish_and_clear();

    let outcomes = into_outcomes(results)?;
    Ok(summarize(outcomes))
}

/// Group requests by app and stanza, keeping plan order inside each group.
fn work_units(requests: &[DispatchRequest]) -> Vec<Vec<&DispatchRequest>> {
    let mut units: IndexMap<(&str, &str), Vec<&DispatchRequest>> = IndexMap::new();
    for request in requests {
        units
            .entry((request.key.app.as_str(), request.key.stanza.as_str()))
            .or_default()
            .push(request);
    }
    units.into_values().collect()
}

fn dispatch_one(request: &DispatchRequest, transport: &dyn Transport, opts: &ExecuteOptions) -> Outcome {
    let url = format!("{}/{}", opts.base_url, request.endpoint);
    let form = request.form();
    let key = &request.key;

    log::debug!("--------------------------------------");
    log::debug!("Processing {} for '{}' in {}", request.kind, key.stanza, key.app);
    log::debug!("API URL: {url}");
    log::debug!("Data: {form:?}");

    if request.dummy {
        log::info!(
            target: DUMMY_TARGET,
            "Dummy run successful for {} in {}. API-url: {url}",
            key.stanza,
            key.app
        );
        return Outcome::Dummy;
    }

    std::thread::sleep(opts.delay());

    let headers = [("Authorization", format!("Bearer {}", opts.token))];
    let failure = |reason: String| {
        Outcome::Failed(Failure {
            key: key.clone(),
            kind: request.kind,
            reason,
        })
    };

    match transport.post(&url, &headers, &form) {
        Ok(response) if response.is_success() => {
            log::info!("API call successful for {url}, '{}' in {}", key.stanza, key.app);
            Outcome::Succeeded
        }
        Ok(response) => {
            log::error!(
                "API call failed for {url}, '{}' in {}. Status Code: {}",
                key.stanza,
                key.app,
                response.status
            );
            log::error!("Response Content: {}", response.body);
            failure(format!("status {}", response.status))
        }
        Err(e) => {
            log::error!(
                "API call failed for {url}, '{}' in {}. {e}, {}",
                key.stanza,
                key.app,
                e.category().recovery()
            );
            failure(e.to_string())
        }
    }
}

fn push_outcome(results: &Arc<Mutex<Vec<Outcome>>>, outcome: Outcome) {
    match results.lock() {
        Ok(mut locked) => locked.push(outcome),
        Err(poisoned) => poisoned.into_inner().push(outcome),
    }
}

fn into_outcomes(results: Arc<Mutex<Vec<Outcome>>>) -> Result<Vec<Outcome>> {
    let mutex = Arc::try_unwrap(results)
        .map_err(|_| anyhow::anyhow!("Failed to collect dispatch results: shared result state"))?;

    match mutex.into_inner() {
        Ok(collected) => Ok(collected),
        Err(poisoned) => Ok(poisoned.into_inner()),
    }
}

fn summarize(outcomes: Vec<Outcome>) -> DispatchReport {
    let mut report = DispatchReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Succeeded => report.succeeded += 1,
            Outcome::Dummy => report.dummy += 1,
            Outcome::Failed(failure) => {
                report.failed += 1;
                report.failures.push(failure);
            }
        }
    }
    report
}

/// Print the batch summary.
pub fn print_summary(report: &DispatchReport) {
    println!();
    if report.is_success() {
        println!("  {} All requests handled", "✓".green().bold());
    } else {
        println!("  {} Some requests failed", "⚠".yellow().bold());
    }
    if report.succeeded > 0 {
        println!("    • {} succeeded", report.succeeded);
    }
    if report.dummy > 0 {
        println!("    • {} dummy (not sent)", report.dummy);
    }
    if report.failed > 0 {
        println!("    • {} {}", report.failed, "failed".red());
        for failure in &report.failures {
            println!(
                "      {} {} {}: {}",
                "✗".red(),
                failure.kind,
                failure.key.stanza,
                failure.reason.dimmed()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::transport::Response;
    use crate::dispatch::transport::tests::MockTransport;
    use std::collections::HashSet;
    use std::thread::ThreadId;
    use stanzakit::conf::parse_string;
    use stanzakit::disposition::resolve;
    use stanzakit::plan::{AppModel, PlanMode, PlanOptions, plan};

    fn options() -> ExecuteOptions {
        ExecuteOptions {
            base_url: "https://splunk:8089".to_string(),
            token: "t".to_string(),
            rate: 1000,
            show_progress: false,
        }
    }

    fn requests(conf: &str, dummy: bool) -> Vec<DispatchRequest> {
        let doc = parse_string(conf);
        let apps = vec![AppModel::resolved("app", resolve(Some(&doc), None).stanzas)];
        let options = PlanOptions {
            dummy,
            ..PlanOptions::default()
        };
        plan(&apps, PlanMode::Enable, &options).requests
    }

    fn create_requests(conf: &str) -> Vec<DispatchRequest> {
        let doc = parse_string(conf);
        let apps = vec![AppModel::resolved("app", resolve(Some(&doc), None).stanzas)];
        plan(&apps, PlanMode::Create, &PlanOptions::default()).requests
    }

    /// Saved search endpoint that rejects ACL updates for objects it has not
    /// created yet. Creations are slow so a racing ACL update would land first.
    #[derive(Default)]
    struct SavedSearchServer {
        created: Mutex<HashSet<String>>,
    }

    impl Transport for SavedSearchServer {
        fn post(
            &self,
            url: &str,
            _headers: &[(&str, String)],
            form: &[(String, String)],
        ) -> stanzakit::Result<Response> {
            let status = match url.strip_suffix("/acl") {
                Some(object) => {
                    let name = object.rsplit('/').next().unwrap_or_default();
                    if self.created.lock().unwrap().contains(name) {
                        200
                    } else {
                        404
                    }
                }
                None => {
                    std::thread::sleep(Duration::from_millis(20));
                    let name = form
                        .iter()
                        .find(|(key, _)| key == "name")
                        .map(|(_, value)| value.clone())
                        .unwrap_or_default();
                    self.created.lock().unwrap().insert(name);
                    201
                }
            };
            Ok(Response {
                status,
                body: String::new(),
            })
        }
    }

    /// Records which pool threads sent requests.
    #[derive(Default)]
    struct ThreadRecorder {
        threads: Mutex<HashSet<ThreadId>>,
    }

    impl Transport for ThreadRecorder {
        fn post(
            &self,
            _url: &str,
            _headers: &[(&str, String)],
            _form: &[(String, String)],
        ) -> stanzakit::Result<Response> {
            self.threads
                .lock()
                .unwrap()
                .insert(std::thread::current().id());
            Ok(Response {
                status: 200,
                body: String::new(),
            })
        }
    }

    #[test]
    fn test_all_requests_sent() {
        let transport = MockTransport::new(200);
        let report = execute(&requests("[a]\n[b]\n[c]\n", false), &transport, &options()).unwrap();

        assert_eq!(report.succeeded, 3);
        assert!(report.is_success());
        assert_eq!(
            transport.urls(),
            vec![
                "https://splunk:8089/servicesNS/nobody/app/configs/conf-savedsearches/a",
                "https://splunk:8089/servicesNS/nobody/app/configs/conf-savedsearches/b",
                "https://splunk:8089/servicesNS/nobody/app/configs/conf-savedsearches/c",
            ]
        );
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let transport = MockTransport::new(200).failing_on("/b");
        let report = execute(&requests("[a]\n[b]\n[c]\n", false), &transport, &options()).unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].key.stanza, "b");
        assert_eq!(transport.urls().len(), 3);
    }

    #[test]
    fn test_error_status_counts_as_failure() {
        let transport = MockTransport::new(404);
        let report = execute(&requests("[a]\n", false), &transport, &options()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].reason, "status 404");
    }

    #[test]
    fn test_dummy_requests_are_not_sent() {
        let transport = MockTransport::new(200);
        let report = execute(&requests("[a]\n[b]\n", true), &transport, &options()).unwrap();
        assert_eq!(report.dummy, 2);
        assert!(transport.urls().is_empty());
    }

    #[test]
    fn test_acl_waits_for_its_create() {
        let conf = "[a]\nsearch = x\n[b]\nsearch = y\n[c]\nsearch = z\n[d]\nsearch = w\n";
        let server = SavedSearchServer::default();
        let report = execute(&create_requests(conf), &server, &options()).unwrap();

        assert_eq!(report.succeeded, 8);
        assert!(report.is_success(), "failures: {:?}", report.failures);
    }

    #[test]
    fn test_work_units_keep_plan_order() {
        let requests = create_requests("[a]\nsearch = x\n[b]\nsearch = y\n");
        let units = work_units(&requests);

        assert_eq!(units.len(), 2);
        for unit in &units {
            let kinds: Vec<_> = unit.iter().map(|request| request.kind).collect();
            assert_eq!(kinds, vec![RequestKind::Create, RequestKind::CreateAcl]);
        }
        assert_eq!(units[0][0].key.stanza, "a");
    }

    #[test]
    fn test_rate_limits_workers_and_spacing() {
        let recorder = ThreadRecorder::default();
        let opts = ExecuteOptions {
            rate: 2,
            ..options()
        };

        let started = Instant::now();
        let report = execute(&requests("[a]\n[b]\n[c]\n[d]\n", false), &recorder, &opts).unwrap();

        assert_eq!(report.succeeded, 4);
        // Four requests on two workers, each waiting half a second first.
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(recorder.threads.lock().unwrap().len() <= 2);
    }

    #[test]
    fn test_dummy_requests_skip_rate_delay() {
        let transport = MockTransport::new(200);
        let opts = ExecuteOptions {
            rate: 1,
            ..options()
        };

        let started = Instant::now();
        let report = execute(&requests("[a]\n[b]\n[c]\n", true), &transport, &opts).unwrap();

        assert_eq!(report.dummy, 3);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_empty_batch() {
        let transport = MockTransport::new(200);
        let report = execute(&[], &transport, &options()).unwrap();
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_form_is_flat() {
        let transport = MockTransport::new(201);
        execute(&requests("[a]\ndisabled = 1\n", false), &transport, &options()).unwrap();
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, vec![("disabled".to_string(), "1".to_string())]);
    }

    #[test]
    fn push_outcome_handles_poisoned_mutex() {
        let results: Arc<Mutex<Vec<Outcome>>> = Arc::new(Mutex::new(Vec::new()));
        let poisoned = Arc::clone(&results);

        let _ = std::thread::spawn(move || {
            let _guard = poisoned
                .lock()
                .expect("lock should succeed before poisoning");
            panic!("intentional poison");
        })
        .join();

        push_outcome(&results, Outcome::Succeeded);

        let collected = into_outcomes(results).expect("poisoned mutex should be recovered");
        assert_eq!(collected.len(), 1);
    }

    #[test]
    fn test_report_counts() {
        let total = DispatchReport {
            succeeded: 1,
            failed: 2,
            dummy: 1,
            ..DispatchReport::default()
        };
        assert_eq!(total.total(), 4);
        assert!(!total.is_success());
    }
}
