//! Layout engine tests: placement invariants and engine-side application

use pretty_assertions::assert_eq;

use matlab_harness::engine::Engine;
use matlab_harness::layout::{self, cascade, tile, Rect, CASCADE_MARGIN, CASCADE_OFFSET};
use matlab_harness::{Handle, LayoutStrategy, MockEngine, MonitorInfo};

fn handles(n: u32) -> Vec<Handle> {
    (1..=n).map(Handle::from).collect()
}

#[test]
fn test_cascade_never_crosses_margins() {
    for (width, height) in [(1920, 1080), (1280, 1024), (1000, 800), (900, 700), (640, 480)] {
        let placements = cascade(&handles(40), width, height);
        let first = placements[0].rect;

        for pair in placements.windows(2) {
            let (prev, next) = (pair[0].rect, pair[1].rect);
            assert!(next.right() <= width - CASCADE_MARGIN || next == first, "{width}x{height}");
            assert!(next.bottom >= CASCADE_MARGIN || next == first, "{width}x{height}");

            let stepped = Rect::new(
                prev.left + CASCADE_OFFSET,
                prev.bottom - CASCADE_OFFSET,
                prev.width,
                prev.height,
            );
            // either the next step or a restart, never anything else
            assert!(next == stepped || next == first, "{width}x{height}: {prev:?} -> {next:?}");
        }
    }
}

#[test]
fn test_cascade_window_size() {
    let placements = cascade(&handles(1), 1920, 1080);
    assert_eq!(placements[0].rect, Rect::new(50, 380, 800, 600));

    let small = cascade(&handles(1), 1000, 800);
    assert_eq!(small[0].rect.width, 600);
    assert_eq!(small[0].rect.height, 480);
}

#[test]
fn test_tile_cells_fit_monitor() {
    let monitor = MonitorInfo {
        left: 1,
        bottom: 1,
        width: 1920,
        height: 1080,
        is_primary: true,
    };
    for n in 1..=12 {
        let placements = tile(&handles(n), &monitor);
        assert_eq!(placements.len(), n as usize);
        for p in &placements {
            assert!(p.rect.left >= monitor.left);
            assert!(p.rect.right() <= monitor.left + monitor.width);
            assert!(p.rect.bottom >= monitor.bottom);
        }
    }
}

#[tokio::test]
async fn test_tile_uses_requested_monitor() {
    let mut engine = MockEngine::new()
        .with_monitors(vec![[1.0, 1.0, 1920.0, 1080.0], [1921.0, 1.0, 1280.0, 1024.0]]);
    engine.eval("plot(1:3)", true).await.unwrap();

    let outcome = layout::position_figures(&mut engine, &handles(1), LayoutStrategy::Tile, 1).await;
    assert_eq!(outcome.positioned, 1);
    assert_eq!(outcome.monitor, Some(1));
    let left = engine.position_of(Handle::from(1)).unwrap()[0];
    assert!(left > 1920.0);
}

#[tokio::test]
async fn test_out_of_range_monitor_falls_back_to_primary() {
    let mut engine = MockEngine::new();
    engine.eval("plot(1:3)", true).await.unwrap();

    let outcome = layout::position_figures(&mut engine, &handles(1), LayoutStrategy::Tile, 5).await;
    assert_eq!(outcome.monitor, Some(0));
    assert_eq!(outcome.positioned, 1);
}

#[tokio::test]
async fn test_unreadable_screen_positions_nothing() {
    let mut engine = MockEngine::new();
    engine.eval("plot(1:3)", true).await.unwrap();
    engine.fail_property("ScreenSize");

    let outcome =
        layout::position_figures(&mut engine, &handles(1), LayoutStrategy::Cascade, 0).await;
    assert_eq!(outcome.positioned, 0);
    assert!(outcome.error.unwrap().starts_with("Failed to position figures"));
    assert_eq!(engine.position_of(Handle::from(1)), None);
}

#[tokio::test]
async fn test_failure_aborts_remaining_updates() {
    let mut engine = MockEngine::new();
    engine
        .eval("plot(1:3)\nfigure; plot(1:3)\nfigure; plot(1:3)", true)
        .await
        .unwrap();
    engine.fail_positioning_after(2);

    let placements = cascade(&handles(3), 1920, 1080);
    let (positioned, error) = layout::apply(&mut engine, &placements).await;
    assert_eq!(positioned, 2);
    assert!(error.is_some());
    assert_eq!(engine.position_of(Handle::from(3)), None);

    let attempts = engine
        .calls()
        .iter()
        .filter(|c| c.starts_with("set_property"))
        .count();
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn test_no_handles_is_a_no_op() {
    let mut engine = MockEngine::new();
    let outcome = layout::position_figures(&mut engine, &[], LayoutStrategy::Cascade, 0).await;
    assert_eq!(outcome.positioned, 0);
    assert!(outcome.error.is_none());
    assert!(engine.calls().is_empty());
}
