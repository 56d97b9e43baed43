use crate::{
    config::Config,
    digital, docx,
    engine::Engine,
    error::ConversionError,
    input, ocr, policy,
    policy::{Route, RouteDecision},
    probe,
    report::{ExtractionAttempt, Extractor, InputInfo, JobReport, JobState},
    tables,
    util::{checked_output_size, ensure_dir, hash_file, now_rfc3339},
};
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Pipeline<E: Engine> {
    cfg: Config,
    engine: E,
}

/// Terminal result of one conversion. `failure` is set iff the job failed.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub state: JobState,
    pub output: PathBuf,
    pub failure: Option<ConversionError>,
    pub report: JobReport,
}

impl ConversionOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }
}

impl<E: Engine> Pipeline<E> {
    pub fn new(cfg: &Config, engine: E) -> Self {
        Self {
            cfg: cfg.clone(),
            engine,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn convert(&self, input: &Path, output: &Path) -> ConversionOutcome {
        self.convert_observed(input, output, &|_| {})
    }

    /// Runs one conversion, reporting every state change to `observe`.
    /// Never returns an error and never lets a panic escape.
    pub fn convert_observed(
        &self,
        input: &Path,
        output: &Path,
        observe: &dyn Fn(JobState),
    ) -> ConversionOutcome {
        let started = Instant::now();
        let mut report = JobReport::new(self.input_info(input), output, now_rfc3339());
        observe(JobState::Start);

        // Set once an extractor may have written to `output`; until then a
        // file already at that path belongs to someone else.
        let wrote_output = Cell::new(false);
        let res = catch_unwind(AssertUnwindSafe(|| {
            self.run(input, output, started, &mut report, observe, &wrote_output)
        }))
        .unwrap_or_else(|panic| Err(ConversionError::Internal(panic_message(&*panic))));

        let failure = match res {
            Ok(bytes) => {
                info!("converted {} -> {} ({bytes} bytes)", input.display(), output.display());
                report.state = JobState::Succeeded;
                None
            }
            Err(err) => {
                warn!("conversion of {} failed: {err}", input.display());
                if self.cfg.output.remove_invalid_output && wrote_output.get() {
                    digital::discard_partial(output);
                }
                report.state = JobState::Failed;
                report.failure = Some(err.clone());
                Some(err)
            }
        };
        report.finished_at = Some(now_rfc3339());
        observe(report.state);

        if self.cfg.output.write_report_json {
            let path = JobReport::path_for(output, &self.cfg.output.report_suffix);
            if let Err(err) = report.write(&path) {
                warn!("could not write job report: {err:#}");
            }
        }

        ConversionOutcome {
            state: report.state,
            output: output.to_path_buf(),
            failure,
            report,
        }
    }

    fn run(
        &self,
        input: &Path,
        output: &Path,
        started: Instant,
        report: &mut JobReport,
        observe: &dyn Fn(JobState),
        wrote_output: &Cell<bool>,
    ) -> Result<u64, ConversionError> {
        input::validate_input(&self.cfg, input)
            .map_err(|err| ConversionError::Input(format!("{err:#}")))?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent).map_err(|err| ConversionError::Internal(format!("{err:#}")))?;
        }

        let probe_res = probe::probe_pdf(&self.cfg, &self.engine, input);
        let decision = policy::decide(&self.cfg, &probe_res);
        info!(
            "classified has_text={} sampled_chars={} route={:?} forced={}",
            probe_res.has_text, probe_res.sampled_chars, decision.route, decision.forced
        );
        let max_pages = self.cfg.limits.max_input_pages;
        if let Some(pages) = probe_res.page_count.filter(|n| max_pages > 0 && *n > max_pages) {
            return Err(ConversionError::Input(format!(
                "{pages} pages, above the {max_pages} page limit"
            )));
        }
        report.probe = Some(probe_res);
        report.decision = Some(decision.clone());
        self.advance(JobState::Classified, report, observe);
        self.check_deadline(started)?;

        wrote_output.set(true);
        self.extract(input, output, &decision, report, started)?;
        self.advance(JobState::Extracted, report, observe);
        self.check_deadline(started)?;

        let augment = tables::augment_with_tables(&self.cfg, &self.engine, input, output);
        report.tables = Some(augment);
        self.advance(JobState::Augmented, report, observe);
        self.check_deadline(started)?;

        let bytes = checked_output_size(output, self.cfg.limits.min_output_bytes)
            .map_err(|err| ConversionError::Validation(format!("{err:#}")))?;
        report.output_bytes = Some(bytes);
        report.document = match docx::inspect(output) {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!("could not summarize {}: {err:#}", output.display());
                None
            }
        };
        self.advance(JobState::Validated, report, observe);
        Ok(bytes)
    }

    fn extract(
        &self,
        input: &Path,
        output: &Path,
        decision: &RouteDecision,
        report: &mut JobReport,
        started: Instant,
    ) -> Result<(), ConversionError> {
        match decision.route {
            Route::Scanned => self
                .attempt_ocr(input, output, report)
                .map_err(ConversionError::Ocr),
            Route::Digital => {
                let t = Instant::now();
                let digital_err = match digital::convert_digital(&self.cfg, &self.engine, input, output) {
                    Ok(_) => {
                        report.attempts.push(attempt(Extractor::Digital, t, None));
                        return Ok(());
                    }
                    Err(err) => format!("{err:#}"),
                };
                warn!("digital extraction failed: {digital_err}");
                report
                    .attempts
                    .push(attempt(Extractor::Digital, t, Some(digital_err.clone())));
                digital::discard_partial(output);

                if !decision.fallback_to_ocr {
                    return Err(ConversionError::Digital(digital_err));
                }
                self.check_deadline(started)?;
                info!("falling back to OCR for {}", input.display());
                self.attempt_ocr(input, output, report)
                    .map_err(|ocr| ConversionError::Extraction {
                        digital: digital_err,
                        ocr,
                    })
            }
        }
    }

    fn attempt_ocr(&self, input: &Path, output: &Path, report: &mut JobReport) -> Result<(), String> {
        let t = Instant::now();
        match ocr::convert_via_ocr(&self.cfg, &self.engine, input, output) {
            Ok(summary) => {
                report.ocr = Some(summary);
                report.attempts.push(attempt(Extractor::Ocr, t, None));
                Ok(())
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!("OCR extraction failed: {reason}");
                report.attempts.push(attempt(Extractor::Ocr, t, Some(reason.clone())));
                digital::discard_partial(output);
                Err(reason)
            }
        }
    }

    fn advance(&self, state: JobState, report: &mut JobReport, observe: &dyn Fn(JobState)) {
        debug!("state {:?} -> {:?}", report.state, state);
        report.state = state;
        observe(state);
    }

    fn check_deadline(&self, started: Instant) -> Result<(), ConversionError> {
        let limit = self.cfg.limits.job_timeout_seconds;
        if limit > 0 && started.elapsed().as_secs() >= limit {
            return Err(ConversionError::Timeout(limit));
        }
        Ok(())
    }

    fn input_info(&self, input: &Path) -> InputInfo {
        InputInfo {
            path: input.display().to_string(),
            bytes: std::fs::metadata(input).map(|m| m.len()).unwrap_or(0),
            fingerprint: hash_file(&self.cfg, input).ok(),
        }
    }
}

fn attempt(extractor: Extractor, t: Instant, reason: Option<String>) -> ExtractionAttempt {
    ExtractionAttempt {
        extractor,
        ok: reason.is_none(),
        reason,
        elapsed_ms: t.elapsed().as_millis(),
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
