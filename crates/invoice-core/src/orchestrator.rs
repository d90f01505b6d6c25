//! Invoice update run
//!
//! One run owns one document: load it, apply every update spec in order,
//! save the result. Load and save failures end the run; anything that goes
//! wrong with a single spec or match is recorded in the `RunReport` and the
//! run carries on.

use crate::config::OverlayConfig;
use crate::document::InvoiceDocument;
use crate::error::OverlayError;
use crate::geometry::Rect;
use crate::locator::{locate_all_with, locate_with, MatchMode, TextMatch};
use crate::overlay::{draw_page_overlays, PlannedOverlay};
use crate::recalc::{parse_amount, rewrite_amount, PriceRecalculation};
use crate::update::{Replacement, UpdateSpec};
use crate::vat::{detect_vat_in_document, VatDetection};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SpecStatus {
    /// At least one match was covered and overlaid
    Applied,
    /// The search text does not occur; nothing was drawn
    NoMatch,
    /// The update could not be applied at all
    Failed(OverlayError),
}

/// A match that was found but not drawn
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedMatch {
    pub page_index: usize,
    pub bbox: Rect,
    pub matched: String,
    pub error: OverlayError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpecOutcome {
    pub search_text: String,
    pub matches_found: usize,
    pub applied: usize,
    pub status: SpecStatus,
    pub recalculations: Vec<PriceRecalculation>,
    pub unresolved: Vec<UnresolvedMatch>,
}

impl SpecOutcome {
    fn new(spec: &UpdateSpec) -> Self {
        Self {
            search_text: spec.search_text.clone(),
            matches_found: 0,
            applied: 0,
            status: SpecStatus::NoMatch,
            recalculations: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    fn failed(mut self, error: OverlayError) -> Self {
        self.status = SpecStatus::Failed(error);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub vat: VatDetection,
    pub specs: Vec<SpecOutcome>,
    /// Set when the result was written to disk
    pub output_path: Option<PathBuf>,
}

impl RunReport {
    /// Overlays drawn across all specs
    pub fn applied_count(&self) -> usize {
        self.specs.iter().map(|s| s.applied).sum()
    }

    /// Specs that drew nothing
    pub fn skipped_count(&self) -> usize {
        self.specs.iter().filter(|s| s.applied == 0).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.specs.iter().map(|s| s.unresolved.len()).sum()
    }

    pub fn recalculations(&self) -> impl Iterator<Item = &PriceRecalculation> {
        self.specs.iter().flat_map(|s| s.recalculations.iter())
    }
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub bytes: Vec<u8>,
    pub report: RunReport,
}

/// States of a run. Each state names the next one in `step`.
#[derive(Debug)]
enum RunState {
    Start,
    Load,
    ApplySpec { index: usize },
    Draw,
    Save,
    Done,
    Failed(OverlayError),
}

/// A located match with its replacement worked out, not yet drawn
#[derive(Debug)]
struct PlannedMatch {
    spec_index: usize,
    page_index: usize,
    matched: String,
    overlay: PlannedOverlay,
    recalculation: Option<PriceRecalculation>,
}

struct Run<'a> {
    source: &'a [u8],
    specs: &'a [UpdateSpec],
    config: &'a OverlayConfig,
    doc: Option<InvoiceDocument>,
    report: RunReport,
    planned: Vec<PlannedMatch>,
    output: Option<Vec<u8>>,
}

impl RunState {
    fn step(self, run: &mut Run<'_>) -> RunState {
        match self {
            RunState::Start => {
                info!(specs = run.specs.len(), bytes = run.source.len(), "starting update run");
                if run.doc.is_some() {
                    RunState::ApplySpec { index: 0 }
                } else {
                    RunState::Load
                }
            }
            RunState::Load => match InvoiceDocument::load(run.source) {
                Ok(doc) => {
                    run.report.vat = detect_vat_in_document(&doc);
                    info!(
                        pages = doc.page_count(),
                        vat = ?run.report.vat.rate_percent,
                        "document loaded"
                    );
                    run.doc = Some(doc);
                    RunState::ApplySpec { index: 0 }
                }
                Err(e) => RunState::Failed(e),
            },
            RunState::ApplySpec { index } => {
                let (Some(spec), Some(doc)) = (run.specs.get(index), run.doc.as_ref()) else {
                    return RunState::Draw;
                };
                let outcome = plan_spec(
                    doc,
                    index,
                    spec,
                    run.config,
                    run.report.vat.rate_percent,
                    &mut run.planned,
                );
                run.report.specs.push(outcome);
                RunState::ApplySpec { index: index + 1 }
            }
            RunState::Draw => {
                let Some(doc) = run.doc.as_mut() else {
                    return RunState::Failed(OverlayError::SaveError("no document loaded".into()));
                };
                let planned = std::mem::take(&mut run.planned);
                draw_planned(doc, planned, &mut run.report.specs);
                RunState::Save
            }
            RunState::Save => {
                if run.report.applied_count() == 0 {
                    // nothing drawn: hand back the source untouched
                    run.output = Some(run.source.to_vec());
                    return RunState::Done;
                }
                let Some(doc) = run.doc.as_mut() else {
                    return RunState::Failed(OverlayError::SaveError("no document loaded".into()));
                };
                match doc.save_to_bytes() {
                    Ok(bytes) => {
                        run.output = Some(bytes);
                        RunState::Done
                    }
                    Err(e) => RunState::Failed(e),
                }
            }
            RunState::Done => RunState::Done,
            RunState::Failed(e) => RunState::Failed(e),
        }
    }
}

/// Apply `specs` to a PDF in memory and return the updated bytes
pub fn update_invoice(
    source: &[u8],
    specs: &[UpdateSpec],
    config: &OverlayConfig,
) -> Result<UpdateOutcome, OverlayError> {
    run_to_completion(Run {
        source,
        specs,
        config,
        doc: None,
        report: RunReport::default(),
        planned: Vec::new(),
        output: None,
    })
}

/// Same as `update_invoice` for a document the caller already loaded from
/// `source` and scanned for VAT. Its cached text layer is reused.
pub(crate) fn update_loaded(
    source: &[u8],
    doc: InvoiceDocument,
    vat: VatDetection,
    specs: &[UpdateSpec],
    config: &OverlayConfig,
) -> Result<UpdateOutcome, OverlayError> {
    run_to_completion(Run {
        source,
        specs,
        config,
        doc: Some(doc),
        report: RunReport {
            vat,
            ..RunReport::default()
        },
        planned: Vec::new(),
        output: None,
    })
}

fn run_to_completion(mut run: Run<'_>) -> Result<UpdateOutcome, OverlayError> {
    let mut state = RunState::Start;
    loop {
        state = match state.step(&mut run) {
            RunState::Done => break,
            RunState::Failed(e) => {
                warn!(error = %e, "update run failed");
                return Err(e);
            }
            next => next,
        };
    }

    let bytes = run
        .output
        .ok_or_else(|| OverlayError::SaveError("run finished without output".into()))?;
    info!(
        applied = run.report.applied_count(),
        skipped = run.report.skipped_count(),
        unresolved = run.report.unresolved_count(),
        "update run finished"
    );
    Ok(UpdateOutcome {
        bytes,
        report: run.report,
    })
}

/// Apply `specs` to the PDF at `input` and write `<stem><suffix>.<ext>`
/// next to it. The input file is only read.
pub fn update_invoice_file(
    input: &Path,
    specs: &[UpdateSpec],
    output_suffix: &str,
    config: &OverlayConfig,
) -> Result<RunReport, OverlayError> {
    let output = output_path(input, output_suffix)?;
    let source = std::fs::read(input)
        .map_err(|e| OverlayError::LoadError(format!("{}: {}", input.display(), e)))?;

    let UpdateOutcome { bytes, mut report } = update_invoice(&source, specs, config)?;

    std::fs::write(&output, bytes)
        .map_err(|e| OverlayError::SaveError(format!("{}: {}", output.display(), e)))?;
    info!(output = %output.display(), "saved updated document");
    report.output_path = Some(output);
    Ok(report)
}

/// `<dir>/<stem><suffix>.<ext>` for `input`
pub fn output_path(input: &Path, output_suffix: &str) -> Result<PathBuf, OverlayError> {
    if output_suffix.is_empty() {
        return Err(OverlayError::SaveError(
            "output suffix must not be empty; the source would be overwritten".into(),
        ));
    }
    let stem = input
        .file_stem()
        .ok_or_else(|| OverlayError::SaveError(format!("{} has no file name", input.display())))?
        .to_string_lossy();
    let file_name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, output_suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, output_suffix),
    };
    Ok(input.with_file_name(file_name))
}

/// Locate every match of one spec and queue what should be drawn over it
fn plan_spec(
    doc: &InvoiceDocument,
    spec_index: usize,
    spec: &UpdateSpec,
    config: &OverlayConfig,
    detected_rate: Option<f64>,
    planned: &mut Vec<PlannedMatch>,
) -> SpecOutcome {
    let outcome = SpecOutcome::new(spec);

    if spec.search_text.is_empty() {
        warn!("skipping update with empty search text");
        return outcome.failed(OverlayError::EmptySearch);
    }

    let mode = if spec.matches_amount() {
        MatchMode::WholeNumber
    } else {
        MatchMode::Substring
    };
    let located = match spec.page {
        Some(page) => locate_with(doc, page, &spec.search_text, mode),
        None => locate_all_with(doc, &spec.search_text, mode),
    };
    let matches = match located {
        Ok(matches) => matches,
        Err(e) => {
            warn!(search = %spec.search_text, error = %e, "locating failed");
            return outcome.failed(e);
        }
    };

    if matches.is_empty() {
        warn!(search = %spec.search_text, "text not found; nothing to update");
        return outcome;
    }

    let style = config.style_for(spec);
    let mut outcome = SpecOutcome {
        matches_found: matches.len(),
        ..outcome
    };

    for m in matches {
        match replacement_for(&m, &spec.replacement, detected_rate) {
            Ok((text, recalculation)) => planned.push(PlannedMatch {
                spec_index,
                page_index: m.page_index,
                matched: m.matched,
                overlay: PlannedOverlay {
                    bbox: m.bbox,
                    text,
                    style: style.clone(),
                },
                recalculation,
            }),
            Err(error) => {
                warn!(page = m.page_index, matched = %m.matched, error = %error, "match left unchanged");
                outcome.unresolved.push(UnresolvedMatch {
                    page_index: m.page_index,
                    bbox: m.bbox,
                    matched: m.matched,
                    error,
                });
            }
        }
    }
    outcome
}

/// Draw everything planned in the run, one batch per page, and settle the
/// status of every spec that had matches
fn draw_planned(doc: &mut InvoiceDocument, planned: Vec<PlannedMatch>, specs: &mut [SpecOutcome]) {
    let mut by_page: BTreeMap<usize, Vec<PlannedMatch>> = BTreeMap::new();
    for p in planned {
        by_page.entry(p.page_index).or_default().push(p);
    }

    for (page_index, matches) in by_page {
        let overlays: Vec<PlannedOverlay> = matches.iter().map(|p| p.overlay.clone()).collect();
        let drawn = draw_page_overlays(doc, page_index, &overlays);
        if let Err(e) = &drawn {
            warn!(page = page_index, error = %e, "page left unchanged");
        }
        for p in matches {
            let Some(outcome) = specs.get_mut(p.spec_index) else {
                continue;
            };
            match &drawn {
                Ok(()) => {
                    debug!(
                        page = page_index,
                        x0 = p.overlay.bbox.x0,
                        y0 = p.overlay.bbox.y0,
                        replacement = %p.overlay.text,
                        "match updated"
                    );
                    outcome.recalculations.extend(p.recalculation);
                    outcome.applied += 1;
                }
                Err(error) => outcome.unresolved.push(UnresolvedMatch {
                    page_index,
                    bbox: p.overlay.bbox,
                    matched: p.matched,
                    error: error.clone(),
                }),
            }
        }
    }

    for outcome in specs.iter_mut().filter(|o| o.matches_found > 0) {
        outcome.status = match (outcome.applied, outcome.unresolved.first()) {
            (0, Some(first)) => SpecStatus::Failed(first.error.clone()),
            _ => SpecStatus::Applied,
        };
    }
}

/// Text to draw for one match, plus the recalculation behind it
fn replacement_for(
    m: &TextMatch,
    replacement: &Replacement,
    detected_rate: Option<f64>,
) -> Result<(String, Option<PriceRecalculation>), OverlayError> {
    match replacement {
        Replacement::Literal(text) => Ok((text.clone(), None)),
        Replacement::CoverAmount => Ok((String::new(), None)),
        Replacement::RecalculatePrice { vat_rate } => {
            let rate = vat_rate.or(detected_rate).ok_or(OverlayError::VatNotDetected)?;
            let prior = parse_amount(&m.matched)?;
            let rec = PriceRecalculation::compute(prior, rate)?;
            let text = rewrite_amount(&m.matched, rec.corrected_value)?;
            Ok((text, Some(rec)))
        }
    }
}
