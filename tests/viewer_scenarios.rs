mod common;

use common::{MockBackend, settle, viewer};
use glam::Vec2;
use imaging_viewer::{
    FilterType, Plane, StudyId, ToolChange, ViewportStatus, VolumePanel,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn selecting_a_study_fetches_one_slice_per_plane() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);

    assert!(viewer.select_study(StudyId(1)).unwrap());
    assert_eq!(*viewer.viewport(Plane::Axial).status(), ViewportStatus::Loading);
    settle(&mut viewer).await;

    let axial = backend.calls_for(Plane::Axial);
    assert_eq!(axial.len(), 1);
    assert_eq!(
        serde_json::to_value(axial[0]).unwrap(),
        json!({
            "file_id": 1,
            "plane": "axial",
            "slice_index": 0,
            "filter_type": "original",
            "window_center": 40.0,
            "window_width": 400.0,
        })
    );
    assert_eq!(backend.process_calls().len(), 3);

    let frame = viewer.viewport_frame(Plane::Axial);
    assert_eq!(frame.status, ViewportStatus::Ready);
    assert_eq!(frame.total_slices, Some(40));
    assert_eq!(frame.slice_label().as_deref(), Some("1 / 40"));
    assert!(!frame.stale);
    assert_eq!(viewer.viewport(Plane::Coronal).total_slices(), Some(256));
}

#[tokio::test(start_paused = true)]
async fn reselecting_the_current_study_is_a_no_op() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);
    viewer.select_study(StudyId(1)).unwrap();
    settle(&mut viewer).await;

    assert!(!viewer.select_study(StudyId(1)).unwrap());
    settle(&mut viewer).await;
    assert_eq!(backend.process_calls().len(), 3);
    assert!(viewer.select_study(StudyId(99)).is_err());
}

#[tokio::test(start_paused = true)]
async fn window_width_drag_sends_only_the_final_value() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);
    viewer.select_study(StudyId(1)).unwrap();
    settle(&mut viewer).await;
    backend.clear_calls();

    for width in [520.0, 640.0, 760.0, 880.0, 1000.0] {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(viewer.set_tool(ToolChange::WindowWidth(width)).unwrap());
    }
    settle(&mut viewer).await;

    for plane in Plane::ALL {
        let calls = backend.calls_for(plane);
        assert_eq!(calls.len(), 1, "{plane}");
        assert_eq!(calls[0].window_width, 1000.0);
    }
    let frame = viewer.viewport_frame(Plane::Sagittal);
    assert_eq!(frame.status, ViewportStatus::Ready);
    assert_eq!(frame.image.unwrap().image.get_pixel(0, 0)[0], 100);
}

#[tokio::test(start_paused = true)]
async fn returning_to_cached_parameters_skips_the_backend() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);
    viewer.select_study(StudyId(1)).unwrap();
    settle(&mut viewer).await;
    viewer.set_tool(ToolChange::WindowWidth(1000.0)).unwrap();
    settle(&mut viewer).await;
    backend.clear_calls();

    viewer.set_tool(ToolChange::WindowWidth(400.0)).unwrap();
    viewer.poll_events();

    let frame = viewer.viewport_frame(Plane::Axial);
    assert_eq!(frame.status, ViewportStatus::Ready);
    assert_eq!(frame.image.unwrap().image.get_pixel(0, 0)[0], 40);
    settle(&mut viewer).await;
    assert!(backend.process_calls().is_empty());
    assert_eq!(viewer.cache().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn display_tools_do_not_refetch() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);
    viewer.select_study(StudyId(1)).unwrap();
    settle(&mut viewer).await;
    backend.clear_calls();

    viewer.set_tool(ToolChange::Zoom(2.0)).unwrap();
    viewer.rotate_90();
    viewer.pointer_down(Plane::Axial, Vec2::new(100.0, 100.0));
    viewer.pointer_move(Vec2::new(110.0, 95.0));
    viewer.pointer_up();
    viewer.pointer_move(Vec2::new(500.0, 500.0));
    settle(&mut viewer).await;

    assert!(backend.process_calls().is_empty());
    assert_eq!(viewer.tools().rotation, 90.0);
    assert_eq!(
        viewer.viewport_frame(Plane::Axial).transform.translation,
        Vec2::new(10.0, -5.0)
    );
    assert_eq!(
        viewer.viewport_frame(Plane::Coronal).transform.translation,
        Vec2::ZERO
    );
}

#[tokio::test(start_paused = true)]
async fn filter_change_refetches_every_plane_once() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);
    viewer.select_study(StudyId(1)).unwrap();
    settle(&mut viewer).await;
    backend.clear_calls();

    viewer.set_tool_named("filterType", "smooth").unwrap();
    settle(&mut viewer).await;

    let calls = backend.process_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|r| r.filter_type == FilterType::Smooth));
}

#[tokio::test(start_paused = true)]
async fn slice_navigation_stays_in_bounds() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);
    assert!(viewer.set_slice(Plane::Axial, 3).is_err());

    viewer.select_study(StudyId(1)).unwrap();
    settle(&mut viewer).await;
    backend.clear_calls();

    viewer.set_slice(Plane::Axial, 20).unwrap();
    assert!(viewer.set_slice(Plane::Axial, 40).is_err());
    settle(&mut viewer).await;
    assert_eq!(
        viewer.viewport_frame(Plane::Axial).slice_label().as_deref(),
        Some("21 / 40")
    );

    viewer.step_slice(Plane::Axial, 100).unwrap();
    settle(&mut viewer).await;
    assert_eq!(viewer.viewport(Plane::Axial).current_slice(), 39);

    let indices: Vec<u32> = backend
        .calls_for(Plane::Axial)
        .iter()
        .map(|r| r.slice_index)
        .collect();
    assert_eq!(indices, vec![20, 39]);
    assert!(backend.calls_for(Plane::Coronal).is_empty());
}

#[tokio::test(start_paused = true)]
async fn failing_viewport_does_not_affect_the_others() {
    let backend = Arc::new(MockBackend::default());
    backend.fail_plane(Plane::Coronal);
    let mut viewer = viewer(&backend);
    viewer.select_study(StudyId(1)).unwrap();
    settle(&mut viewer).await;
    settle(&mut viewer).await;

    assert!(matches!(
        viewer.viewport(Plane::Coronal).status(),
        ViewportStatus::Failed(message) if message.contains("cannot process coronal")
    ));
    assert_eq!(*viewer.viewport(Plane::Axial).status(), ViewportStatus::Ready);
    assert_eq!(*viewer.viewport(Plane::Sagittal).status(), ViewportStatus::Ready);
    assert_eq!(backend.calls_for(Plane::Coronal).len(), 1);

    backend.heal_plane(Plane::Coronal);
    viewer.retry(Plane::Coronal).unwrap();
    settle(&mut viewer).await;
    assert_eq!(*viewer.viewport(Plane::Coronal).status(), ViewportStatus::Ready);
    assert_eq!(backend.calls_for(Plane::Coronal).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn switching_study_before_the_debounce_only_fetches_the_new_one() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);
    viewer.select_study(StudyId(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    viewer.select_study(StudyId(2)).unwrap();
    settle(&mut viewer).await;

    let calls = backend.process_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|r| r.study == StudyId(2)));
    assert_eq!(viewer.studies().selected().map(|s| s.id), Some(StudyId(2)));
}

#[tokio::test(start_paused = true)]
async fn volume_is_requested_once_per_study() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);
    assert!(matches!(viewer.volume_panel(), VolumePanel::Placeholder));

    viewer.select_study(StudyId(1)).unwrap();
    assert!(matches!(viewer.volume_panel(), VolumePanel::Loading));
    settle(&mut viewer).await;
    viewer.select_study(StudyId(2)).unwrap();
    viewer.select_study(StudyId(1)).unwrap();
    settle(&mut viewer).await;

    match viewer.volume_panel() {
        VolumePanel::Ready(volume) => assert_eq!(volume.dim(), (8, 8, 8)),
        other => panic!("expected a ready volume, got {other:?}"),
    }
    assert_eq!(
        *backend.volume_calls.lock().unwrap(),
        vec![(StudyId(1), 128), (StudyId(2), 128)]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_volume_is_reported_and_retried_on_request() {
    let backend = Arc::new(MockBackend {
        volume: None,
        ..MockBackend::default()
    });
    let mut viewer = viewer(&backend);
    viewer.select_study(StudyId(1)).unwrap();
    settle(&mut viewer).await;

    assert!(matches!(
        viewer.volume_panel(),
        VolumePanel::Failed(message) if message.contains("File not found")
    ));
    assert!(viewer.retry_volume());
    settle(&mut viewer).await;
    assert_eq!(backend.volume_calls.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn uploads_are_listed_newest_first() {
    let backend = Arc::new(MockBackend::default());
    let mut viewer = viewer(&backend);
    let id = viewer.upload("chest.nii", vec![1, 2, 3]).await.unwrap();

    let studies = viewer.studies().studies();
    assert_eq!(studies[0].id, id);
    assert_eq!(studies[0].name, "chest.nii");
    assert_eq!(studies[0].path.as_deref(), Some("uploads/chest.nii"));
    assert!(viewer.studies().selected().is_none());
}
