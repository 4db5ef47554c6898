mod common;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use docxide_layout::engine::{ChangeEvent, Lifecycle, SnapshotHost};
use docxide_layout::fonts::FontBook;
use docxide_layout::header_footer::{HeaderFooterKind, HeaderFooterSummary, SlotRole};
use docxide_layout::layout::LayoutOrigin;
use docxide_layout::model::DocumentSnapshot;
use docxide_layout::numbering::{
    AbstractNumbering, LevelDefinition, NumberingDefinitions, NumberingInstance,
};
use docxide_layout::surface::MountPoint;
use docxide_layout::{EngineConfig, EngineOptions, LayoutPackage, MeasurementEngine, TextFlowSurface, paginate_snapshot};

use common::{
    BlockSurface, SurfaceLog, assert_close, doc, header_footers, hf_section, list_item, p, paragraphs,
};

struct Harness {
    host: Rc<SnapshotHost>,
    log: Rc<SurfaceLog>,
    engine: MeasurementEngine,
    published: Rc<RefCell<Vec<Arc<LayoutPackage>>>>,
}

fn start(document: &DocumentSnapshot, renderable: bool) -> Harness {
    let host = Rc::new(SnapshotHost::new(document));
    let log = SurfaceLog::new(renderable);
    let published = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&published);
    let engine = MeasurementEngine::initialize(
        EngineOptions::new(BlockSurface::new(Rc::clone(&log)))
            .host(host.clone())
            .on_update(move |layout| sink.borrow_mut().push(Arc::clone(layout))),
    );
    Harness {
        host,
        log,
        engine,
        published,
    }
}

fn poll_ready(engine: &MeasurementEngine) -> Poll<bool> {
    let mut ready = pin!(engine.await_ready());
    ready.as_mut().poll(&mut Context::from_waker(Waker::noop()))
}

#[test]
fn paginates_on_initialize() {
    let h = start(&doc(paragraphs(20)), true);

    assert!(h.engine.is_ready());
    assert_eq!(h.engine.lifecycle(), Lifecycle::Ready);
    assert_eq!(poll_ready(&h.engine), Poll::Ready(true));

    let layout = h.engine.layout().expect("layout");
    assert_eq!(layout.pages.len(), 2);
    assert_eq!(layout.document.revision, 1);
    assert_eq!(layout.origin, LayoutOrigin::Measured);
    assert_eq!(layout.pages[0].content_area.usable_height_px, 768.0);
    assert_eq!(layout.pages[1].break_info.start_offset_px, 768.0);
    assert_eq!(h.engine.page_breaks().len(), 2);
    assert_eq!(h.published.borrow().len(), 1);
    assert_eq!(h.host.listener_count(), 1);
}

#[test]
fn header_reservation_shrinks_the_body() {
    let mut document = doc(paragraphs(20));
    document.header_footers = Some(header_footers(vec![hf_section(
        "header1",
        SlotRole::Header,
        HeaderFooterKind::Default,
        5,
    )]));
    let h = start(&document, true);

    let layout = h.engine.layout().expect("layout");
    let page = &layout.pages[0];
    assert_eq!(page.header_footer_areas.header.measured_height_px, 100.0);
    assert_eq!(page.header_footer_areas.header.reserved_height_px, 52.0);
    assert_eq!(page.content_area.start_px, 148.0);
    assert_eq!(page.content_area.usable_height_px, 716.0);
    // 14 lines of 48 px fit in 716 px.
    assert_eq!(layout.pages[1].break_info.start_offset_px, 672.0);

    let summary = h.engine.header_footer_summary();
    assert_eq!(summary.content_width_px, 576.0);
    assert!(summary.section_metrics_by_id.contains_key("header1"));
}

#[test]
fn page_style_change_remeasures_header_footers() {
    let mut document = doc(paragraphs(5));
    document.header_footers = Some(header_footers(vec![hf_section(
        "header1",
        SlotRole::Header,
        HeaderFooterKind::Default,
        1,
    )]));
    let h = start(&document, true);
    assert_eq!(h.engine.header_footer_summary().content_width_px, 576.0);
    let fragments = h.log.fragments.get();

    if let Some(style) = document.page_style.as_mut() {
        style.margins.left = 1.5;
    }
    h.host.set_snapshot(&document);

    assert_eq!(h.log.fragments.get(), fragments + 1);
    assert_eq!(h.engine.header_footer_summary().content_width_px, 528.0);
    let layout = h.engine.layout().expect("layout");
    assert_eq!(layout.pages[0].metrics.content_width_px, Some(528.0));
}

#[test]
fn body_edit_keeps_the_header_footer_measurements() {
    let mut document = doc(paragraphs(5));
    document.header_footers = Some(header_footers(vec![hf_section(
        "header1",
        SlotRole::Header,
        HeaderFooterKind::Default,
        1,
    )]));
    let h = start(&document, true);
    let fragments = h.log.fragments.get();

    document.content = paragraphs(6);
    h.host.set_snapshot(&document);
    assert_eq!(h.log.fragments.get(), fragments);
    assert_eq!(h.published.borrow().len(), 2);
}

#[test]
fn identical_change_publishes_once() {
    let h = start(&doc(paragraphs(3)), true);
    let changed = doc(paragraphs(4));

    h.host.set_snapshot(&changed);
    h.host.set_snapshot(&changed);
    h.host.notify_selection();

    assert_eq!(h.published.borrow().len(), 2);
    assert_eq!(h.engine.layout().map(|l| l.document.revision), Some(2));
    assert_eq!(h.log.measures.get(), 2);
}

#[test]
fn selection_only_events_are_ignored() {
    let h = start(&doc(paragraphs(3)), true);
    let event = ChangeEvent {
        doc_changed: false,
        snapshot: serde_json::to_value(doc(paragraphs(9))).ok(),
    };
    assert!(!h.engine.on_document_changed(&event));
    assert_eq!(h.engine.view(), Some(doc(paragraphs(3))));
}

#[test]
fn override_leaves_the_baseline_alone() {
    let mut document = doc(paragraphs(20));
    document.header_footers = Some(header_footers(vec![hf_section(
        "header1",
        SlotRole::Header,
        HeaderFooterKind::Default,
        1,
    )]));
    let h = start(&document, true);
    let baseline = h.engine.baseline().expect("baseline");
    let measured = h.engine.layout().expect("layout");

    let mut replacement = (*measured).clone();
    replacement.header_footer_summary = Some(HeaderFooterSummary {
        content_width_px: 1.0,
        ..Default::default()
    });
    let value = serde_json::to_value(&replacement).expect("serialize");
    let installed = h
        .engine
        .apply_layout_override(&value, Some("collaborator"))
        .expect("override accepted");

    assert_eq!(
        installed.origin,
        LayoutOrigin::Override {
            source: Some("collaborator".to_string())
        }
    );
    assert_eq!(h.engine.header_footer_summary().content_width_px, 1.0);
    assert!(Arc::ptr_eq(&h.engine.baseline().expect("baseline"), &baseline));
    assert_eq!(h.published.borrow().len(), 2);

    let recomputed = h.engine.recompute_pagination().expect("live engine");
    assert_eq!(recomputed.origin, LayoutOrigin::Measured);
    assert_eq!(h.engine.header_footer_summary().content_width_px, 576.0);
}

#[test]
fn malformed_overrides_are_rejected() {
    let h = start(&doc(paragraphs(20)), true);
    let before = h.engine.layout().expect("layout");

    assert!(h.engine.apply_layout_override(&serde_json::json!([1, 2]), None).is_none());
    assert!(h.engine.apply_layout_override(&serde_json::json!({"pages": 3}), None).is_none());

    let mut gappy = (*before).clone();
    gappy.pages[1].page_index = 5;
    assert!(h.engine.apply_layout(gappy, None).is_none());

    assert!(Arc::ptr_eq(&h.engine.layout().expect("layout"), &before));
    assert_eq!(h.published.borrow().len(), 1);
}

#[test]
fn null_break_tops_survive_an_override() {
    let h = start(&doc(paragraphs(20)), true);
    let mut value = serde_json::to_value(&*h.engine.layout().expect("layout")).expect("serialize");
    value["pages"][1]["break"]["top"] = serde_json::Value::Null;

    let installed = h.engine.apply_layout_override(&value, None).expect("override accepted");
    assert_eq!(installed.pages.len(), 2);
    assert!(installed.pages[1].break_info.top.is_nan());
    assert_eq!(h.engine.page_breaks().len(), 1);
}

#[test]
fn destroy_before_ready_settles_the_wait_negatively() {
    let h = start(&doc(paragraphs(5)), false);
    assert!(!h.engine.is_ready());
    assert_eq!(poll_ready(&h.engine), Poll::Pending);

    h.engine.destroy();
    h.engine.destroy();

    assert_eq!(poll_ready(&h.engine), Poll::Ready(false));
    assert!(h.engine.is_destroyed());
    assert_eq!(h.log.teardowns.get(), 1);
    assert_eq!(*h.log.removed.borrow(), vec!["block-mirror-1".to_string()]);
    assert_eq!(h.host.listener_count(), 0);
    assert!(h.engine.layout().is_none());
    assert!(h.engine.recompute_pagination().is_none());
}

#[test]
fn caller_mount_is_never_removed() {
    let host = Rc::new(SnapshotHost::new(&doc(paragraphs(2))));
    let log = SurfaceLog::new(true);
    let engine = MeasurementEngine::initialize(
        EngineOptions::new(BlockSurface::new(Rc::clone(&log)))
            .host(host)
            .mount(MountPoint::new("host-mount")),
    );
    engine.destroy();
    assert_eq!(log.created.get(), 0);
    assert!(log.removed.borrow().is_empty());
    assert_eq!(log.teardowns.get(), 1);
}

#[test]
fn changes_after_destroy_are_dropped() {
    let h = start(&doc(paragraphs(2)), true);
    h.engine.destroy();
    h.host.set_snapshot(&doc(paragraphs(8)));
    let event = ChangeEvent {
        doc_changed: true,
        snapshot: None,
    };
    assert!(!h.engine.on_document_changed(&event));
    assert_eq!(h.published.borrow().len(), 1);
    assert_eq!(h.engine.view(), None);
}

#[test]
fn surface_created_later_makes_the_engine_ready() {
    let h = start(&doc(paragraphs(20)), false);
    assert_eq!(h.engine.lifecycle(), Lifecycle::Constructing);

    h.log.renderable.set(true);
    let layout = h.engine.on_surface_created().expect("layout");

    assert!(h.engine.is_ready());
    assert_eq!(poll_ready(&h.engine), Poll::Ready(true));
    assert_eq!(layout.pages.len(), 2);
}

#[test]
fn engine_without_host_is_ready_and_empty() {
    let log = SurfaceLog::new(true);
    let engine = MeasurementEngine::initialize(EngineOptions::new(BlockSurface::new(Rc::clone(&log))));

    assert!(engine.is_ready());
    assert_eq!(engine.layout().map(|l| l.pages.len()), Some(0));
    assert!(engine.on_surface_created().is_none());
    assert_eq!(log.attaches.get(), 0);
}

#[test]
fn header_footer_editor_never_subscribes() {
    let host = Rc::new(SnapshotHost::new(&doc(paragraphs(20))));
    let log = SurfaceLog::new(true);
    let engine = MeasurementEngine::initialize(
        EngineOptions::new(BlockSurface::new(Rc::clone(&log)))
            .host(host.clone())
            .config(EngineConfig {
                header_footer_only: true,
                ..Default::default()
            }),
    );

    assert!(engine.is_ready());
    assert_eq!(host.listener_count(), 0);
    assert_eq!(engine.layout().map(|l| l.pages.len()), Some(0));
    assert_eq!(log.measures.get(), 0);
}

#[test]
fn schema_mismatch_keeps_the_previous_mirror() {
    let original = doc(paragraphs(3));
    let h = start(&original, true);

    h.host.set_raw_snapshot(serde_json::json!({"content": 5}));

    assert_eq!(h.engine.view(), Some(original));
    assert_eq!(h.published.borrow().len(), 1);
    assert_eq!(h.engine.layout().map(|l| l.document.revision), Some(1));
}

#[test]
fn change_during_publish_is_replayed_after_the_pass() {
    let doc2 = doc(paragraphs(4));
    let doc3 = doc(paragraphs(30));

    let host = Rc::new(SnapshotHost::new(&doc(paragraphs(2))));
    let revisions = Rc::new(RefCell::new(Vec::new()));
    let fired = Rc::new(Cell::new(false));
    let engine = {
        let host_in_callback = Rc::clone(&host);
        let revisions = Rc::clone(&revisions);
        let doc3 = doc3.clone();
        MeasurementEngine::initialize(
            EngineOptions::new(BlockSurface::new(SurfaceLog::new(true)))
                .host(host.clone())
                .on_update(move |layout| {
                    revisions.borrow_mut().push(layout.document.revision);
                    if layout.document.revision == 2 && !fired.replace(true) {
                        host_in_callback.set_snapshot(&doc3);
                    }
                }),
        )
    };

    host.set_snapshot(&doc2);

    assert_eq!(*revisions.borrow(), vec![1, 2, 3]);
    assert_eq!(engine.view(), Some(doc3));
    assert_eq!(engine.layout().map(|l| l.pages.len()), Some(2));
}

fn numbered_doc() -> DocumentSnapshot {
    let mut levels = BTreeMap::new();
    levels.insert(
        0,
        LevelDefinition {
            num_fmt: "decimal".to_string(),
            lvl_text: "%1.".to_string(),
            indent_left_pt: 36.0,
            indent_hanging_pt: 18.0,
            ..Default::default()
        },
    );
    let mut numbering = NumberingDefinitions::default();
    numbering.abstracts.insert(0, AbstractNumbering { levels });
    numbering.instances.insert(
        1,
        NumberingInstance {
            abstract_id: 0,
            start_overrides: BTreeMap::new(),
        },
    );
    let mut document = doc(vec![list_item("first", 1, 0), p("body"), list_item("second", 1, 0)]);
    document.numbering = Some(numbering);
    document
}

#[test]
fn settle_places_list_labels() {
    let h = start(&numbered_doc(), true);

    let markers = h.engine.list_markers();
    let labels: Vec<&str> = markers.values().map(|m| m.text.as_str()).collect();
    assert_eq!(labels, vec!["1.", "2."]);
    assert_eq!(h.engine.pending_settle_tasks(), 2);
    assert!(h.engine.marker_geometry().is_empty());

    assert_eq!(h.engine.settle(), 2);
    let geometry = h.engine.marker_geometry();
    let first = &geometry[&0];
    assert_close(first.marker_left_px, 24.0, "marker left");
    assert_close(first.marker_width_px, 14.0, "marker width");
    assert_close(first.separator_width_px, 10.0, "separator");
    assert_close(first.text_left_px, 48.0, "text left");

    h.engine.recompute_pagination();
    assert_eq!(h.engine.pending_settle_tasks(), 0);
    assert_eq!(h.engine.settle(), 0);
}

#[test]
fn removed_list_item_drops_its_geometry() {
    let h = start(&numbered_doc(), true);
    h.engine.settle();

    let mut shorter = numbered_doc();
    shorter.content.truncate(2);
    h.host.set_snapshot(&shorter);

    assert_eq!(h.engine.list_markers().len(), 1);
    assert_eq!(h.engine.marker_geometry().len(), 1);
    assert_eq!(h.engine.pending_settle_tasks(), 0);
}

#[test]
fn text_flow_pages_grow_with_content() {
    let short = paginate_snapshot(&doc(paragraphs(5)), FontBook::new(), EngineConfig::default());
    let long = paginate_snapshot(&doc(paragraphs(400)), FontBook::new(), EngineConfig::default());

    assert_eq!(short.pages.len(), 1);
    assert!(long.pages.len() > 1);
    for pair in long.pages.windows(2) {
        assert!(pair[0].break_info.end_offset_px <= pair[1].break_info.start_offset_px + 0.01);
        assert!(pair[0].break_info.pos < pair[1].break_info.pos);
    }
    for (i, page) in long.pages.iter().enumerate() {
        assert_eq!(page.page_index, i);
    }
}

#[test]
fn text_flow_surface_attaches_to_its_mount() {
    let host = Rc::new(SnapshotHost::new(&doc(paragraphs(3))));
    let engine = MeasurementEngine::initialize(EngineOptions::new(TextFlowSurface::new(FontBook::new())).host(host));
    assert!(engine.is_ready());
    assert_eq!(engine.layout().map(|l| l.pages.len()), Some(1));
}
