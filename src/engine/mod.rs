//! The measurement engine: mirrors a live document, paginates it, and
//! publishes layout packages.
//!
//! Everything here is single-threaded. A pass (sync, measure, break, publish)
//! runs to completion before the next change is looked at; change
//! notifications that arrive while a pass is running are held and replayed
//! afterwards.

mod events;
mod ready;
mod settle;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Instant;

pub use events::{ChangeEvent, EditorHost, Emitter, ListenerId, SnapshotHost};
pub use ready::{ReadyFuture, ReadyGate};
pub use settle::{MarkerGeometry, MarkerTask, SettleQueue};

use crate::fields::project_field_segments;
use crate::header_footer::{
    HeaderFooterRepository, HeaderFooterSummary, measure_header_footer_sections, resolve_header_footer_for_page,
};
use crate::layout::{
    BreakInfo, CloneTier, DocumentVersion, LAYOUT_SCHEMA_VERSION, LayoutOrigin, LayoutPackage, snapshot_layout,
};
use crate::model::{DocumentSnapshot, PageStyle, visit_paragraphs};
use crate::numbering::{ListMarkers, NumberingCounterStore, assign_list_markers};
use crate::pagination::{
    BREAK_TOLERANCE_PX, BreakOptions, DEFAULT_PAGE_GAP_PX, MAX_BREAK_PROBES, PageConstraints, generate_pages,
};
use crate::surface::{MeasureSurface, MountPoint};
use crate::units::{Units, pt_to_px};

const MIN_TAB_PT: f32 = 36.0;

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub page_gap_px: f32,
    pub page_top_offset_px: f32,
    pub break_tolerance_px: f32,
    pub max_break_probes: usize,
    /// Log recoverable failures at `warn` instead of `debug`.
    pub dev_diagnostics: bool,
    /// The engine belongs to a header/footer editor: never paginate.
    pub header_footer_only: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_gap_px: DEFAULT_PAGE_GAP_PX,
            page_top_offset_px: 0.0,
            break_tolerance_px: BREAK_TOLERANCE_PX,
            max_break_probes: MAX_BREAK_PROBES,
            dev_diagnostics: cfg!(debug_assertions),
            header_footer_only: false,
        }
    }
}

impl EngineConfig {
    fn break_options(&self) -> BreakOptions {
        BreakOptions {
            tolerance_px: self.break_tolerance_px,
            max_probes: self.max_break_probes,
            page_gap_px: self.page_gap_px,
            page_top_offset_px: self.page_top_offset_px,
            dev_diagnostics: self.dev_diagnostics,
        }
    }
}

pub type LayoutCallback = Rc<dyn Fn(&Arc<LayoutPackage>)>;

pub struct EngineOptions {
    pub host: Option<Rc<dyn EditorHost>>,
    /// Caller-owned mount point; the engine never removes it.
    pub mount: Option<MountPoint>,
    pub surface: Box<dyn MeasureSurface>,
    pub on_update: Option<LayoutCallback>,
    pub header_footer_repository: Option<Rc<dyn HeaderFooterRepository>>,
    pub config: EngineConfig,
}

impl EngineOptions {
    pub fn new(surface: impl MeasureSurface + 'static) -> Self {
        Self {
            host: None,
            mount: None,
            surface: Box::new(surface),
            on_update: None,
            header_footer_repository: None,
            config: EngineConfig::default(),
        }
    }

    pub fn host(mut self, host: Rc<dyn EditorHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn mount(mut self, mount: MountPoint) -> Self {
        self.mount = Some(mount);
        self
    }

    pub fn on_update(mut self, callback: impl Fn(&Arc<LayoutPackage>) + 'static) -> Self {
        self.on_update = Some(Rc::new(callback));
        self
    }

    pub fn header_footer_repository(mut self, repository: Rc<dyn HeaderFooterRepository>) -> Self {
        self.header_footer_repository = Some(repository);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Constructing,
    Ready,
    Destroyed,
}

enum SyncOutcome {
    Unchanged,
    Updated { remeasure_header_footers: bool },
    Failed,
}

struct EngineState {
    config: EngineConfig,
    host: Option<Rc<dyn EditorHost>>,
    listener: Option<ListenerId>,
    surface: Box<dyn MeasureSurface>,
    mount: Option<MountPoint>,
    owns_mount: bool,
    repository: Option<Rc<dyn HeaderFooterRepository>>,
    mirror: Option<DocumentSnapshot>,
    revision: u64,
    measured_summary: Arc<HeaderFooterSummary>,
    displayed_summary: Arc<HeaderFooterSummary>,
    layout: Option<Arc<LayoutPackage>>,
    baseline: Option<Arc<LayoutPackage>>,
    page_breaks: Vec<BreakInfo>,
    numbering: NumberingCounterStore,
    markers: ListMarkers,
    settle: SettleQueue<MarkerTask>,
    marker_geometry: BTreeMap<u32, MarkerGeometry>,
}

impl EngineState {
    fn page_style(&self) -> PageStyle {
        self.mirror
            .as_ref()
            .and_then(|doc| doc.page_style)
            .or_else(|| self.host.as_ref().map(|h| h.page_style_defaults()))
            .unwrap_or_default()
    }

    fn sync(&mut self, snapshot: Option<serde_json::Value>) -> SyncOutcome {
        let Some(value) = snapshot.or_else(|| self.host.as_ref().and_then(|h| h.current_snapshot())) else {
            return SyncOutcome::Unchanged;
        };
        let doc: DocumentSnapshot = match serde_json::from_value(value) {
            Ok(doc) => doc,
            Err(e) => {
                crate::dev_warn!(self.config.dev_diagnostics; "mirror sync failed, keeping previous state: {}", crate::Error::Schema(e.to_string()));
                return SyncOutcome::Failed;
            }
        };
        if self.mirror.as_ref() == Some(&doc) {
            log::debug!("mirror already matches the live document");
            return SyncOutcome::Unchanged;
        }
        let header_footers_changed = self.mirror.as_ref().map(|m| &m.header_footers) != Some(&doc.header_footers);
        let previous_style = self.page_style();
        self.mirror = Some(doc);
        self.revision += 1;
        // Header/footer wrap width and slot bounds follow the page box.
        let page_style_changed = self.page_style() != previous_style;
        SyncOutcome::Updated {
            remeasure_header_footers: header_footers_changed || page_style_changed,
        }
    }

    fn measure_header_footers(&mut self) {
        let t0 = Instant::now();
        let definitions = match &self.repository {
            Some(repo) => match repo.definitions() {
                Ok(defs) => Some(defs),
                Err(e) => {
                    crate::dev_warn!(self.config.dev_diagnostics; "header/footer repository failed: {e}");
                    None
                }
            },
            None => self.mirror.as_ref().and_then(|doc| doc.header_footers.clone()),
        };
        let Some(definitions) = definitions else {
            if self.repository.is_none() {
                self.measured_summary = Arc::new(HeaderFooterSummary::default());
            }
            return;
        };
        let page = PageConstraints::from_style(&self.page_style());
        let empty = DocumentSnapshot::default();
        let context = self.mirror.as_ref().unwrap_or(&empty);
        let summary = measure_header_footer_sections(&definitions, context, self.surface.as_mut(), &page);
        // Swapped whole: a pass never sees a half-built summary.
        self.measured_summary = Arc::new(summary);
        log::debug!(
            "header/footer measurement took {:.1}ms",
            t0.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Returns the package and whether it was measured from a live mirror.
    fn run_pass(&mut self) -> (Arc<LayoutPackage>, bool) {
        if self.config.header_footer_only {
            return (self.install_empty_layout(), false);
        }
        let t0 = Instant::now();
        let empty = DocumentSnapshot::default();
        let doc = self.mirror.as_ref().unwrap_or(&empty);
        let page = PageConstraints::from_style(&self.page_style());

        let markers = assign_list_markers(doc, &mut self.numbering);
        let t_numbering = t0.elapsed();

        let flow = self.surface.measure(doc, &markers, &page);
        let live = flow.is_some();
        let t_measure = t0.elapsed();

        let summary = Arc::clone(&self.measured_summary);
        let options = self.config.break_options();
        let pages = generate_pages(flow.as_ref(), &page, &options, &mut |index, query| {
            resolve_header_footer_for_page(&summary.variant_lookup, &summary.section_metrics_by_id, index, query)
        });
        let field_segments = flow
            .as_ref()
            .map(|f| project_field_segments(&f.fields, &pages))
            .unwrap_or_default();
        let t_break = t0.elapsed();

        let layout = Arc::new(LayoutPackage {
            schema_version: LAYOUT_SCHEMA_VERSION,
            document: DocumentVersion::of(self.revision, doc),
            units: Units::default(),
            pages,
            field_segments,
            header_footer_summary: Some((*summary).clone()),
            origin: LayoutOrigin::Measured,
        });

        let (baseline, tier) = snapshot_layout(&layout);
        if tier != CloneTier::Structural {
            crate::dev_warn!(self.config.dev_diagnostics; "baseline stored with {tier:?} clone");
        }
        let schedule_t = Instant::now();
        self.schedule_marker_geometry(&markers);
        self.markers = markers;
        self.baseline = Some(baseline);
        self.page_breaks = layout.page_breaks();
        self.displayed_summary = summary;
        self.layout = Some(Arc::clone(&layout));

        log::info!(
            "Paginated {} pages ({} breaks) in {:.1}ms (numbering {:.1}ms, measure {:.1}ms, break {:.1}ms, publish {:.1}ms)",
            layout.pages.len(),
            self.page_breaks.len(),
            t0.elapsed().as_secs_f64() * 1000.0,
            t_numbering.as_secs_f64() * 1000.0,
            (t_measure - t_numbering).as_secs_f64() * 1000.0,
            (t_break - t_measure).as_secs_f64() * 1000.0,
            schedule_t.elapsed().as_secs_f64() * 1000.0,
        );
        (layout, live)
    }

    /// Queue label geometry for list paragraphs whose marker changed.
    fn schedule_marker_geometry(&mut self, markers: &ListMarkers) {
        let stale: Vec<u32> = self
            .markers
            .keys()
            .chain(self.marker_geometry.keys())
            .filter(|pos| !markers.contains_key(pos))
            .copied()
            .collect();
        for pos in stale {
            self.settle.cancel(pos);
            self.marker_geometry.remove(&pos);
        }

        let Some(doc) = self.mirror.as_ref() else {
            return;
        };
        let previous = &self.markers;
        let geometry = &self.marker_geometry;
        let settle = &mut self.settle;
        visit_paragraphs(&doc.content, |pos, para| {
            let Some(marker) = markers.get(&pos) else {
                return;
            };
            if previous.get(&pos) == Some(marker) && geometry.contains_key(&pos) {
                return;
            }
            let attrs = doc.effective_attrs(para);
            settle.schedule(
                pos,
                MarkerTask {
                    text: marker.text.clone(),
                    font_size_pt: attrs
                        .font_size_pt
                        .resolve(crate::pagination::DEFAULT_FONT_SIZE_PT),
                    font_family: attrs.font_family.value().cloned(),
                    indent_left_pt: attrs.indent_left_pt.value().copied().unwrap_or(marker.indent_left_pt),
                    indent_hanging_pt: attrs
                        .indent_hanging_pt
                        .value()
                        .copied()
                        .unwrap_or(marker.indent_hanging_pt),
                },
            );
        });
    }

    fn settle(&mut self) -> usize {
        let tasks = self.settle.drain();
        let count = tasks.len();
        for (pos, task) in tasks {
            let marker_left = pt_to_px(task.indent_left_pt - task.indent_hanging_pt);
            let text_left = pt_to_px(task.indent_left_pt);
            let marker_width = self
                .surface
                .text_width_px(&task.text, task.font_size_pt, task.font_family.as_deref());
            let label_end = marker_left + marker_width;
            let separator = if label_end < text_left {
                text_left - label_end
            } else {
                // Label runs past the indent: the tab jumps to the next stop.
                let stop = pt_to_px(MIN_TAB_PT);
                stop - (label_end - text_left) % stop
            };
            self.marker_geometry.insert(
                pos,
                MarkerGeometry {
                    pos,
                    marker_left_px: marker_left,
                    marker_width_px: marker_width,
                    separator_width_px: separator,
                    text_left_px: label_end + separator,
                },
            );
        }
        count
    }

    fn install_empty_layout(&mut self) -> Arc<LayoutPackage> {
        let layout = Arc::new(LayoutPackage::empty(DocumentVersion::default()));
        self.layout = Some(Arc::clone(&layout));
        self.baseline = Some(Arc::clone(&layout));
        self.page_breaks.clear();
        layout
    }
}

struct Inner {
    state: RefCell<EngineState>,
    lifecycle: Cell<Lifecycle>,
    ready: ReadyGate,
    on_update: RefCell<Option<LayoutCallback>>,
    busy: Cell<bool>,
    deferred: RefCell<Option<ChangeEvent>>,
    dev_diagnostics: bool,
}

/// Handle to a measurement engine. Cloning shares the engine.
#[derive(Clone)]
pub struct MeasurementEngine {
    inner: Rc<Inner>,
}

impl MeasurementEngine {
    /// Build the mirror, subscribe to the host, and run the first pass.
    ///
    /// Never fails: without a host (or for a header/footer-only engine) the
    /// engine is ready straight away with an empty layout.
    pub fn initialize(options: EngineOptions) -> Self {
        let dev_diagnostics = options.config.dev_diagnostics;
        let header_footer_only = options.config.header_footer_only;
        let engine = Self {
            inner: Rc::new(Inner {
                state: RefCell::new(EngineState {
                    config: options.config,
                    host: None,
                    listener: None,
                    surface: options.surface,
                    mount: None,
                    owns_mount: false,
                    repository: options.header_footer_repository,
                    mirror: None,
                    revision: 0,
                    measured_summary: Arc::new(HeaderFooterSummary::default()),
                    displayed_summary: Arc::new(HeaderFooterSummary::default()),
                    layout: None,
                    baseline: None,
                    page_breaks: Vec::new(),
                    numbering: NumberingCounterStore::new(),
                    markers: ListMarkers::new(),
                    settle: SettleQueue::new(),
                    marker_geometry: BTreeMap::new(),
                }),
                lifecycle: Cell::new(Lifecycle::Constructing),
                ready: ReadyGate::new(),
                on_update: RefCell::new(options.on_update),
                busy: Cell::new(false),
                deferred: RefCell::new(None),
                dev_diagnostics,
            }),
        };

        let host = match options.host {
            Some(host) if !header_footer_only => host,
            other => {
                if other.is_none() {
                    log::debug!("no live document, engine starts empty");
                }
                engine.inner.state.borrow_mut().install_empty_layout();
                engine.inner.lifecycle.set(Lifecycle::Ready);
                engine.inner.ready.resolve(true);
                return engine;
            }
        };

        {
            let mut state = engine.inner.state.borrow_mut();
            let (mount, owns_mount) = match options.mount {
                Some(mount) => (mount, false),
                None => (state.surface.create_mount(), true),
            };
            state.surface.attach(&mount);
            state.mount = Some(mount);
            state.owns_mount = owns_mount;

            let weak: Weak<Inner> = Rc::downgrade(&engine.inner);
            let listener = host.on_change(Rc::new(move |event: &ChangeEvent| {
                if let Some(inner) = weak.upgrade() {
                    MeasurementEngine { inner }.on_document_changed(event);
                }
            }));
            state.listener = Some(listener);
            state.host = Some(host);

            if let SyncOutcome::Failed = state.sync(None) {
                log::debug!("initial snapshot rejected, starting from an empty mirror");
            }
            state.measure_header_footers();
        }
        engine.recompute_pagination();
        engine
    }

    /// Handle a transaction from the live document. Returns true if it led
    /// to a new layout.
    pub fn on_document_changed(&self, event: &ChangeEvent) -> bool {
        if !event.doc_changed || self.is_destroyed() {
            return false;
        }
        if self.inner.busy.get() {
            log::debug!("change arrived during a pass, deferring");
            self.inner.deferred.replace(Some(event.clone()));
            return false;
        }
        let mut recomputed = false;
        let mut next = Some(event.clone());
        while let Some(event) = next.take() {
            recomputed |= self.sync_and_recompute(event.snapshot);
            next = self.inner.deferred.borrow_mut().take();
        }
        recomputed
    }

    fn sync_and_recompute(&self, snapshot: Option<serde_json::Value>) -> bool {
        let outcome = {
            let mut state = self.inner.state.borrow_mut();
            let outcome = state.sync(snapshot);
            if let SyncOutcome::Updated {
                remeasure_header_footers: true,
            } = outcome
            {
                state.measure_header_footers();
            }
            outcome
        };
        match outcome {
            SyncOutcome::Updated { .. } => self.publish_pass().is_some(),
            SyncOutcome::Unchanged | SyncOutcome::Failed => false,
        }
    }

    /// Paginate the mirror as it stands and publish the result.
    /// `None` once destroyed.
    pub fn recompute_pagination(&self) -> Option<Arc<LayoutPackage>> {
        let layout = self.publish_pass()?;
        if !self.inner.busy.get() {
            let deferred = self.inner.deferred.borrow_mut().take();
            if let Some(event) = deferred {
                self.on_document_changed(&event);
            }
        }
        Some(layout)
    }

    fn publish_pass(&self) -> Option<Arc<LayoutPackage>> {
        if self.is_destroyed() {
            return None;
        }
        let was_busy = self.inner.busy.replace(true);
        let (layout, live) = self.inner.state.borrow_mut().run_pass();
        if live {
            self.inner.lifecycle.set(Lifecycle::Ready);
            self.inner.ready.resolve(true);
        }
        self.publish(&layout);
        self.inner.busy.set(was_busy);
        Some(layout)
    }

    fn publish(&self, layout: &Arc<LayoutPackage>) {
        let callback = self.inner.on_update.borrow().clone();
        if let Some(callback) = callback {
            callback(layout);
        }
    }

    /// Install a layout produced elsewhere. `value` must be a JSON object in
    /// the layout package schema; anything else is rejected with `None`.
    pub fn apply_layout_override(
        &self,
        value: &serde_json::Value,
        source: Option<&str>,
    ) -> Option<Arc<LayoutPackage>> {
        if !value.is_object() {
            crate::dev_warn!(self.inner.dev_diagnostics; "layout override rejected: not an object");
            return None;
        }
        let layout: LayoutPackage = match serde_json::from_value(value.clone()) {
            Ok(layout) => layout,
            Err(e) => {
                crate::dev_warn!(self.inner.dev_diagnostics; "layout override rejected: {e}");
                return None;
            }
        };
        self.apply_layout(layout, source)
    }

    /// Typed form of [`MeasurementEngine::apply_layout_override`]. The
    /// baseline is left alone.
    pub fn apply_layout(&self, mut layout: LayoutPackage, source: Option<&str>) -> Option<Arc<LayoutPackage>> {
        if self.is_destroyed() {
            return None;
        }
        if let Some((i, page)) = layout.pages.iter().enumerate().find(|(i, p)| p.page_index != *i) {
            crate::dev_warn!(self.inner.dev_diagnostics; "layout override rejected: page {i} has index {}", page.page_index);
            return None;
        }
        layout.origin = LayoutOrigin::Override {
            source: source.map(str::to_string),
        };
        let layout = Arc::new(layout);
        {
            let mut state = self.inner.state.borrow_mut();
            state.page_breaks = layout.page_breaks();
            state.displayed_summary = Arc::new(layout.header_footer_summary.clone().unwrap_or_default());
            state.layout = Some(Arc::clone(&layout));
        }
        log::info!("Installed layout override with {} pages", layout.pages.len());
        self.publish(&layout);
        Some(layout)
    }

    /// The measurement surface is now attached to something that renders.
    pub fn on_surface_created(&self) -> Option<Arc<LayoutPackage>> {
        if self.is_destroyed() {
            return None;
        }
        {
            let mut state = self.inner.state.borrow_mut();
            if state.host.is_none() {
                return None;
            }
            if !state.surface.is_attached()
                && let Some(mount) = state.mount.clone()
            {
                state.surface.attach(&mount);
            }
            state.measure_header_footers();
        }
        self.recompute_pagination()
    }

    pub fn refresh_header_footer_measurements(&self) -> Option<Arc<LayoutPackage>> {
        if self.is_destroyed() {
            return None;
        }
        self.inner.state.borrow_mut().measure_header_footers();
        self.recompute_pagination()
    }

    /// Unsubscribe, tear the mirror down, and drop all state. Safe to call
    /// more than once.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }
        self.inner.lifecycle.set(Lifecycle::Destroyed);
        let host_and_listener = {
            let mut state = self.inner.state.borrow_mut();

            if let Some(mount) = state.mount.take()
                && state.owns_mount
            {
                state.surface.remove_mount(&mount);
            }
            state.surface.teardown();
            state.layout = None;
            state.baseline = None;
            state.mirror = None;
            state.page_breaks.clear();
            state.markers.clear();
            state.settle.clear();
            state.marker_geometry.clear();
            state.numbering.clear();
            state.repository = None;
            (state.host.take(), state.listener.take())
        };
        if let (Some(host), Some(listener)) = host_and_listener {
            host.off_change(listener);
        }
        self.inner.on_update.replace(None);
        self.inner.deferred.replace(None);
        self.inner.ready.resolve(false);
        log::debug!("measurement engine destroyed");
    }

    /// Run deferred list-label geometry. Returns how many labels were placed.
    pub fn settle(&self) -> usize {
        if self.is_destroyed() {
            return 0;
        }
        self.inner.state.borrow_mut().settle()
    }

    pub fn await_ready(&self) -> ReadyFuture {
        self.inner.ready.wait()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.outcome() == Some(true) && !self.is_destroyed()
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle() == Lifecycle::Destroyed
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    pub fn layout(&self) -> Option<Arc<LayoutPackage>> {
        self.inner.state.borrow().layout.clone()
    }

    pub fn baseline(&self) -> Option<Arc<LayoutPackage>> {
        self.inner.state.borrow().baseline.clone()
    }

    pub fn page_breaks(&self) -> Vec<BreakInfo> {
        self.inner.state.borrow().page_breaks.clone()
    }

    /// Summary behind the layout currently displayed (an override's own
    /// summary while one is installed).
    pub fn header_footer_summary(&self) -> Arc<HeaderFooterSummary> {
        Arc::clone(&self.inner.state.borrow().displayed_summary)
    }

    /// A copy of the mirrored document.
    pub fn view(&self) -> Option<DocumentSnapshot> {
        self.inner.state.borrow().mirror.clone()
    }

    pub fn list_markers(&self) -> ListMarkers {
        self.inner.state.borrow().markers.clone()
    }

    pub fn marker_geometry(&self) -> BTreeMap<u32, MarkerGeometry> {
        self.inner.state.borrow().marker_geometry.clone()
    }

    pub fn pending_settle_tasks(&self) -> usize {
        self.inner.state.borrow().settle.len()
    }
}
