mod common;

use common::cube_volume;
use glam::{Mat4, Vec3};
use imaging_viewer::raycast::{Ray, march, render_cpu};
use imaging_viewer::{OrbitCamera, RayCastSettings, VolumeBuffer};

fn cube_scene() -> (VolumeBuffer, RayCastSettings) {
    let volume = VolumeBuffer::from_raw(cube_volume(64, 4), (64, 64, 64)).unwrap();
    let settings = RayCastSettings::new(0.5, 1.0, 128);
    (volume, settings)
}

#[test]
fn rays_through_empty_space_are_transparent() {
    let (volume, settings) = cube_scene();
    for (x, y) in [(0.3, 0.3), (-0.4, 0.1), (0.2, -0.45)] {
        let ray = Ray::new(Vec3::new(x, y, 2.0), Vec3::NEG_Z);
        assert_eq!(march(&volume, &ray, &settings), None, "ray at ({x}, {y})");
    }
}

#[test]
fn rays_through_the_cube_are_opaque() {
    let (volume, settings) = cube_scene();
    let ray = Ray::new(Vec3::new(0.0, 0.0, 2.0), Vec3::NEG_Z);
    let [r, g, b, a] = march(&volume, &ray, &settings).expect("cube is hit");
    assert!(a > 0.1, "alpha {a}");
    assert!(a <= 1.0);
    assert_eq!(r, g);
    assert_eq!(g, b);

    let sideways = Ray::new(Vec3::new(-3.0, 0.0, 0.0), Vec3::X);
    assert!(march(&volume, &sideways, &settings).is_some());
}

#[test]
fn cpu_frame_shows_the_cube_only_in_the_middle() {
    let (volume, settings) = cube_scene();
    let camera = OrbitCamera::default();
    let frame = render_cpu(&volume, &camera, &Mat4::IDENTITY, &settings, 63, 63).unwrap();

    assert!(frame.get_pixel(31, 31)[3] > 0);
    for (x, y) in [(0, 0), (62, 0), (0, 62), (62, 62), (10, 31), (31, 50)] {
        assert_eq!(frame.get_pixel(x, y).0, [0, 0, 0, 0], "pixel ({x}, {y})");
    }
}

#[test]
fn raising_the_threshold_above_the_cube_hides_it() {
    let (volume, mut settings) = cube_scene();
    settings.set_threshold(1.0);
    let ray = Ray::new(Vec3::new(0.0, 0.0, 2.0), Vec3::NEG_Z);
    assert_eq!(march(&volume, &ray, &settings), None);
}

#[test]
fn model_transform_moves_the_volume() {
    let (volume, settings) = cube_scene();
    let model = Mat4::from_translation(Vec3::new(0.5, 0.0, 0.0));
    let ray = Ray::new(Vec3::new(0.5, 0.0, 2.0), Vec3::NEG_Z).to_object_space(&model.inverse());
    assert!(march(&volume, &ray, &settings).is_some());
}
