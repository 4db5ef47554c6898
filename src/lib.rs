/// Log a recoverable failure at `warn` when `$enabled` (development) and at
/// `debug` otherwise. Each engine passes its own `dev_diagnostics` setting.
macro_rules! dev_warn {
    ($enabled:expr; $($arg:tt)+) => {
        if $enabled {
            log::warn!($($arg)+)
        } else {
            log::debug!($($arg)+)
        }
    };
}
pub(crate) use dev_warn;

pub mod docx;
pub mod engine;
mod error;
pub mod fields;
pub mod fonts;
pub mod header_footer;
pub mod layout;
pub mod model;
pub mod numbering;
pub mod pagination;
pub mod surface;
pub mod units;

pub use engine::{EngineConfig, EngineOptions, MeasurementEngine};
pub use error::Error;
pub use layout::{BreakInfo, LayoutPackage, Page};
pub use model::DocumentSnapshot;
pub use pagination::TextFlowSurface;

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use engine::SnapshotHost;
use fonts::FontBook;

/// Paginate one snapshot with the built-in surface and return its layout.
pub fn paginate_snapshot(doc: &DocumentSnapshot, fonts: FontBook, config: EngineConfig) -> Arc<LayoutPackage> {
    let t0 = Instant::now();
    let host = Rc::new(SnapshotHost::new(doc));
    let engine = MeasurementEngine::initialize(
        EngineOptions::new(TextFlowSurface::new(fonts))
            .host(host)
            .config(config),
    );
    let layout = engine
        .layout()
        .unwrap_or_else(|| Arc::new(LayoutPackage::empty(layout::DocumentVersion::default())));
    engine.destroy();

    log::info!(
        "Timing: paginate={:.1}ms ({} pages)",
        t0.elapsed().as_secs_f64() * 1000.0,
        layout.pages.len(),
    );
    layout
}
