use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use docxide_layout::layout::{CloneTier, LayoutOrigin, snapshot_layout, snapshot_with_fallback};
use docxide_layout::LayoutPackage;

fn page_json(index: usize, top: serde_json::Value) -> serde_json::Value {
    let mut page = serde_json::json!({
        "pageIndex": index,
        "break": {
            "startOffsetPx": index as f32 * 800.0,
            "endOffsetPx": (index + 1) as f32 * 800.0,
            "pos": index * 10,
            "fittedBottom": (index + 1) as f32 * 800.0,
        },
        "metrics": {
            "pageHeightPx": 1000.0,
            "pageWidthPx": 800.0,
            "marginTopPx": 100.0,
            "marginRightPx": 100.0,
            "marginBottomPx": 100.0,
            "marginLeftPx": 100.0,
            "contentHeightPx": 800.0,
            "contentWidthPx": 600.0,
            "headerHeightPx": 0.0,
            "footerHeightPx": 0.0,
            "pageGapPx": 20.0,
            "spacingAfterPx": 20.0,
        },
        "headerFooterAreas": {
            "header": {"measuredHeightPx": 0.0, "reservedHeightPx": 0.0, "slot": {"topPx": 50.0, "leftPx": 100.0, "rightPx": 100.0, "heightPx": 0.0, "maxHeightPx": 50.0}},
            "footer": {"measuredHeightPx": 0.0, "reservedHeightPx": 0.0, "slot": {"topPx": 950.0, "leftPx": 100.0, "rightPx": 100.0, "heightPx": 0.0, "maxHeightPx": 50.0}},
        },
        "pageTopOffsetPx": index as f32 * 1020.0,
        "pageGapPx": 20.0,
        "contentArea": {"startPx": 100.0, "endPx": 900.0, "usableHeightPx": 800.0},
    });
    if !top.is_null() || index == 1 {
        page["break"]["top"] = top;
    }
    page
}

#[test]
fn missing_or_null_break_top_reads_as_invalid() {
    let value = serde_json::json!({
        "pages": [
            page_json(0, serde_json::json!(0.0)),
            page_json(1, serde_json::Value::Null),
            page_json(2, serde_json::Value::Null),
        ],
    });
    let layout: LayoutPackage = serde_json::from_value(value).expect("layout package");

    assert_eq!(layout.pages.len(), 3);
    assert!(layout.pages[0].break_info.is_valid());
    assert!(layout.pages[1].break_info.top.is_nan());
    assert!(layout.pages[2].break_info.top.is_nan());
    assert_eq!(layout.origin, LayoutOrigin::Measured);
    assert!(layout.field_segments.is_empty());

    let breaks = layout.page_breaks();
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].pos, 0);
}

#[test]
fn nan_tops_serialize_as_null() {
    let value = serde_json::json!({"pages": [page_json(0, serde_json::Value::Null)]});
    let layout: LayoutPackage = serde_json::from_value(value).expect("layout package");
    let out = serde_json::to_value(&layout).expect("serialize");
    assert!(out["pages"][0]["break"]["top"].is_null());
    assert_eq!(out["origin"]["kind"], "measured");
}

#[test]
fn override_origin_round_trips_its_source() {
    let value = serde_json::json!({
        "pages": [],
        "origin": {"kind": "override", "source": "server"},
    });
    let layout: LayoutPackage = serde_json::from_value(value).expect("layout package");
    assert_eq!(
        layout.origin,
        LayoutOrigin::Override {
            source: Some("server".to_string())
        }
    );
}

#[test]
fn baseline_snapshot_is_structural_and_independent() {
    let value = serde_json::json!({"pages": [page_json(0, serde_json::json!(0.0))]});
    let layout: Arc<LayoutPackage> = Arc::new(serde_json::from_value(value).expect("layout package"));
    let (copy, tier) = snapshot_layout(&layout);
    assert_eq!(tier, CloneTier::Structural);
    assert!(!Arc::ptr_eq(&copy, &layout));
    assert_eq!(*copy, *layout);
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Plain {
    values: Vec<u32>,
}

#[test]
fn panicking_clone_falls_back_to_json() {
    let original = Arc::new(Plain { values: vec![1, 2, 3] });
    let (copy, tier) = snapshot_with_fallback(&original, |_| panic!("clone unavailable"));
    assert_eq!(tier, CloneTier::Serialized);
    assert!(!Arc::ptr_eq(&copy, &original));
    assert_eq!(*copy, *original);
}

/// Tuple keys have no JSON map representation.
#[derive(Debug, Serialize, Deserialize)]
struct TupleKeyed {
    cells: BTreeMap<(u8, u8), u8>,
}

#[test]
fn unserializable_value_is_shared() {
    let mut cells = BTreeMap::new();
    cells.insert((1, 2), 3);
    let original = Arc::new(TupleKeyed { cells });
    let (copy, tier) = snapshot_with_fallback(&original, |_| panic!("clone unavailable"));
    assert_eq!(tier, CloneTier::Shallow);
    assert!(Arc::ptr_eq(&copy, &original));
}
