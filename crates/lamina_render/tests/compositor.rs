//! Compositor and screenshot cache behavior against an in-memory scene

use lamina_core::{
    BlendMode, ChannelMask, CompositeMode, ContextLayer, LayerBlend, LayerId, LayerSetId,
    ObjectId, Rect, ViewState,
};
use lamina_paint::Color;
use lamina_render::{
    CompositeOutcome, Compositor, CompositorSettings, MemoryScene, ResourceManager,
    ScreenshotCache, ScreenshotKey, SpatialIndex,
};
use std::sync::Arc;

const ACTIVE: LayerId = LayerId::new(1);
const ABOVE: LayerId = LayerId::new(2);
const BELOW: LayerId = LayerId::new(3);

fn compositor(scene: &Arc<MemoryScene>) -> Compositor {
    Compositor::new(
        Arc::clone(scene) as Arc<dyn SpatialIndex>,
        Arc::clone(scene) as Arc<dyn ResourceManager>,
        Arc::new(ScreenshotCache::new(32)),
        CompositorSettings::default(),
    )
}

fn view(rect: Rect, scale: f64) -> ViewState {
    ViewState::new(LayerSetId::new(1), ACTIVE, rect, scale)
}

/// Two tiles side by side and a vector rectangle on top, as a viewer
/// would show a stitched montage with an annotation
fn montage() -> Arc<MemoryScene> {
    let scene = Arc::new(MemoryScene::new());
    scene.add_solid_tile(ACTIVE, ObjectId::new(1), Rect::new(0.0, 0.0, 500.0, 500.0), [255, 0, 0, 255]);
    scene.add_solid_tile(ACTIVE, ObjectId::new(2), Rect::new(500.0, 0.0, 500.0, 500.0), [0, 0, 255, 255]);
    scene.add_rect(ACTIVE, ObjectId::new(3), Rect::new(100.0, 100.0, 50.0, 50.0), Color::GREEN);
    scene
}

fn stacked() -> Arc<MemoryScene> {
    let scene = montage();
    scene.add_solid_tile(ABOVE, ObjectId::new(10), Rect::new(0.0, 0.0, 40.0, 40.0), [0, 200, 0, 255]);
    scene.add_solid_tile(BELOW, ObjectId::new(20), Rect::new(20.0, 20.0, 40.0, 40.0), [0, 0, 200, 255]);
    scene
}

#[test]
fn test_end_to_end_scene() {
    let scene = montage();
    let compositor = compositor(&scene);
    let shot = compositor
        .composite(&view(Rect::new(0.0, 0.0, 1000.0, 1000.0), 1.0))
        .into_screenshot()
        .unwrap();
    let raster = shot.raster();

    assert_eq!(raster.width(), 1000);
    assert_eq!(raster.height(), 1000);
    // Both tiles
    assert_eq!(raster.get_pixel(50, 50), Some([255, 0, 0, 255]));
    assert_eq!(raster.get_pixel(499, 499), Some([255, 0, 0, 255]));
    assert_eq!(raster.get_pixel(500, 0), Some([0, 0, 255, 255]));
    assert_eq!(raster.get_pixel(750, 250), Some([0, 0, 255, 255]));
    // Vector rectangle over the first tile
    assert_eq!(raster.get_pixel(100, 100), Some([0, 255, 0, 255]));
    assert_eq!(raster.get_pixel(125, 125), Some([0, 255, 0, 255]));
    assert_eq!(raster.get_pixel(149, 149), Some([0, 255, 0, 255]));
    assert_eq!(raster.get_pixel(150, 150), Some([255, 0, 0, 255]));
    assert_eq!(raster.get_pixel(99, 125), Some([255, 0, 0, 255]));
    // Nothing below the tiles
    assert_eq!(raster.get_pixel(250, 750), Some([0, 0, 0, 0]));
}

#[test]
fn test_panned_view_offsets_pixels() {
    let scene = montage();
    let compositor = compositor(&scene);
    let shot = compositor
        .composite(&view(Rect::new(90.0, 90.0, 100.0, 100.0), 2.0))
        .into_screenshot()
        .unwrap();
    let raster = shot.raster();

    assert_eq!(raster.width(), 200);
    // World (95, 95) is tile, world (100, 100) starts the vector rect
    assert_eq!(raster.get_pixel(10, 10), Some([255, 0, 0, 255]));
    assert_eq!(raster.get_pixel(20, 20), Some([0, 255, 0, 255]));
    assert_eq!(raster.get_pixel(119, 119), Some([0, 255, 0, 255]));
    assert_eq!(raster.get_pixel(120, 120), Some([255, 0, 0, 255]));
}

#[test]
fn test_objects_far_beyond_the_view_are_composited() {
    let scene = Arc::new(MemoryScene::new());
    scene.add_rect(ACTIVE, ObjectId::new(1), Rect::new(-3e9, 0.0, 3e9 + 10.0, 5.0), Color::RED);
    scene.add_rect(ACTIVE, ObjectId::new(2), Rect::new(5.0, 5.0, 3e9, 5.0), Color::BLUE);
    let compositor = compositor(&scene);

    let shot = compositor
        .composite(&view(Rect::new(0.0, 0.0, 10.0, 10.0), 1.0))
        .into_screenshot()
        .unwrap();
    assert_eq!(shot.raster().get_pixel(0, 0), Some([255, 0, 0, 255]));
    assert_eq!(shot.raster().get_pixel(9, 4), Some([255, 0, 0, 255]));
    assert_eq!(shot.raster().get_pixel(9, 9), Some([0, 0, 255, 255]));
    assert_eq!(shot.raster().get_pixel(4, 9), Some([0, 0, 0, 0]));
}

#[test]
fn test_context_order_does_not_miss_cache() {
    let scene = stacked();
    let compositor = compositor(&scene);
    let base = view(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0).with_mode(CompositeMode::MultiLayer);
    let forward = base
        .clone()
        .with_context_layers([ContextLayer::new(ABOVE, 1), ContextLayer::new(BELOW, -1)]);
    let reversed = base.with_context_layers([ContextLayer::new(BELOW, -1), ContextLayer::new(ABOVE, 1)]);

    let first = compositor.composite(&forward).into_screenshot().unwrap();
    let queries = scene.query_count();
    let second = compositor.composite(&reversed);

    assert!(second.is_cached());
    assert_eq!(scene.query_count(), queries);
    let second = second.into_screenshot().unwrap();
    assert_eq!(first.raster().data(), second.raster().data());
    assert_eq!(compositor.rendered_count(), 1);
}

#[test]
fn test_every_key_field_forces_a_miss() {
    let scene = stacked();
    let compositor = compositor(&scene);
    let base = view(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0);
    assert!(!compositor.composite(&base).is_cached());

    let variants = [
        base.clone().with_view(base.world_rect, 0.5),
        base.clone().with_view(Rect::new(10.0, 0.0, 100.0, 100.0), 1.0),
        base.clone()
            .with_channel_mask(ChannelMask::default().with_enabled(lamina_core::channel::RED, false)),
        base.clone().with_mode(CompositeMode::MultiLayer),
        base.clone().with_active_layer(ABOVE),
        base.clone().with_active_object(Some(ObjectId::new(3))),
    ];
    for variant in &variants {
        assert_ne!(ScreenshotKey::from_view(variant), ScreenshotKey::from_view(&base));
        let queries = scene.query_count();
        let outcome = compositor.composite(variant);
        assert!(matches!(outcome, CompositeOutcome::Rendered(_)), "{variant:?}");
        assert!(scene.query_count() > queries, "{variant:?}");
    }

    // And all of them are now cached side by side
    for variant in &variants {
        assert!(compositor.composite(variant).is_cached());
    }
    assert!(compositor.composite(&base).is_cached());
}

#[test]
fn test_single_equals_multi_layer_without_context() {
    let scene = stacked();
    let compositor = compositor(&scene);
    let single = view(Rect::new(0.0, 0.0, 200.0, 200.0), 1.0);
    let multi = single
        .clone()
        .with_mode(CompositeMode::MultiLayer)
        // The active layer itself and invisible layers contribute nothing
        .with_context_layers([
            ContextLayer::new(ACTIVE, 0),
            ContextLayer::new(ABOVE, 1).with_blend(LayerBlend::new(BlendMode::Add, 0.0)),
        ]);

    let a = compositor.render(&single).unwrap();
    let b = compositor.render(&multi).unwrap();
    assert!(a.raster().is_identical_to(b.raster()));
}

#[test]
fn test_context_layers_change_the_composite() {
    let scene = stacked();
    let compositor = compositor(&scene);
    let single = view(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0);
    let multi = single
        .clone()
        .with_mode(CompositeMode::MultiLayer)
        .with_context_layers([ContextLayer::new(ABOVE, 1).with_blend(LayerBlend::new(BlendMode::Normal, 0.5))]);

    let a = compositor.render(&single).unwrap();
    let b = compositor.render(&multi).unwrap();
    // The ghost tile covers (0, 0, 40, 40), half transparent over red
    let ghosted = b.raster().get_pixel(10, 10).unwrap();
    assert_eq!(a.raster().get_pixel(10, 10), Some([255, 0, 0, 255]));
    assert!(ghosted[0] < 255 && ghosted[1] > 0);
    // Outside the ghost tile nothing changes
    assert_eq!(a.raster().get_pixel(80, 80), b.raster().get_pixel(80, 80));
}

#[test]
fn test_rgb_channel_isolation() {
    let scene = montage();
    scene.add_solid_tile(ACTIVE, ObjectId::new(4), Rect::new(0.0, 500.0, 300.0, 300.0), [90, 180, 30, 255]);
    let compositor = compositor(&scene);
    let rect = Rect::new(0.0, 0.0, 1000.0, 1000.0);
    let rgb = view(rect, 0.25).with_mode(CompositeMode::Rgb {
        red: Some(ACTIVE),
        green: None,
        blue: None,
    });
    let gray = compositor
        .render(&view(rect, 0.25))
        .unwrap()
        .raster()
        .to_gray()
        .unwrap();

    let shot = compositor.render(&rgb).unwrap();
    let raster = shot.raster();
    for (i, px) in raster.data().chunks_exact(4).enumerate() {
        assert_eq!(px[1], 0, "green at {i}");
        assert_eq!(px[2], 0, "blue at {i}");
        assert_eq!(px[0], gray.data()[i], "red at {i}");
    }
}

#[test]
fn test_rgb_channel_darkens_partial_coverage() {
    let scene = Arc::new(MemoryScene::new());
    scene.add_rect(ACTIVE, ObjectId::new(1), Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE.with_alpha(0.5));
    scene.add_rect(ACTIVE, ObjectId::new(2), Rect::new(10.0, 0.0, 10.0, 10.0), Color::WHITE);
    let compositor = compositor(&scene);
    let rgb = view(Rect::new(0.0, 0.0, 20.0, 10.0), 1.0).with_mode(CompositeMode::Rgb {
        red: Some(ACTIVE),
        green: None,
        blue: None,
    });

    let shot = compositor.render(&rgb).unwrap();
    let half = shot.raster().get_pixel(5, 5).unwrap();
    assert!((120..=136).contains(&half[0]), "half coverage gave {half:?}");
    assert_eq!(&half[1..], &[0, 0, 255]);
    assert_eq!(shot.raster().get_pixel(15, 5), Some([255, 0, 0, 255]));
}

#[test]
fn test_layer_invalidation_drops_only_that_layer() {
    let scene = stacked();
    let compositor = compositor(&scene);
    let active = view(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0);
    let above = active.clone().with_active_layer(ABOVE);
    compositor.composite(&active);
    compositor.composite(&above);

    scene.add_rect(ABOVE, ObjectId::new(11), Rect::new(50.0, 50.0, 10.0, 10.0), Color::WHITE);
    assert_eq!(compositor.cache().invalidate(ABOVE), 1);

    assert!(compositor.composite(&active).is_cached());
    let fresh = compositor.composite(&above);
    assert!(!fresh.is_cached());
    let fresh = fresh.into_screenshot().unwrap();
    assert_eq!(fresh.raster().get_pixel(55, 55), Some([255, 255, 255, 255]));
}

#[test]
fn test_region_invalidation_spares_disjoint_views() {
    let scene = montage();
    let compositor = compositor(&scene);
    let left = view(Rect::new(0.0, 0.0, 200.0, 200.0), 1.0);
    let right = view(Rect::new(600.0, 0.0, 200.0, 200.0), 1.0);
    compositor.composite(&left);
    compositor.composite(&right);

    let removed = scene.remove(ObjectId::new(3)).unwrap();
    compositor
        .cache()
        .invalidate_intersecting(LayerSetId::new(1), &removed);

    assert!(compositor.composite(&right).is_cached());
    let left = compositor.composite(&left);
    assert!(!left.is_cached());
    let shot = left.into_screenshot().unwrap();
    assert_eq!(shot.raster().get_pixel(125, 125), Some([255, 0, 0, 255]));
}

#[test]
fn test_cache_bound_evicts_oldest() {
    let scene = montage();
    let compositor = Compositor::new(
        Arc::clone(&scene) as Arc<dyn SpatialIndex>,
        Arc::clone(&scene) as Arc<dyn ResourceManager>,
        Arc::new(ScreenshotCache::new(2)),
        CompositorSettings::default(),
    );
    let views: Vec<ViewState> = (0..3)
        .map(|i| view(Rect::new(i as f64 * 10.0, 0.0, 50.0, 50.0), 1.0))
        .collect();
    for v in &views {
        compositor.composite(v);
    }

    assert_eq!(compositor.cache().len(), 2);
    assert!(compositor.cache().contains(&ScreenshotKey::from_view(&views[2])));
    assert!(!compositor.cache().contains(&ScreenshotKey::from_view(&views[0])));
}
