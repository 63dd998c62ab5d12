use quickcheck_macros::quickcheck;
use sfm_core::nalgebra::{Point3, Rotation3, Vector3};
use sfm_core::{Pose, WorldPoint, WorldToCamera};
use sfm_pinhole::{back_project, project_to_image, CameraIntrinsics, ImageSize};

const EPS: f64 = 1e-4;
const TOLERANCE: f64 = 1e-7;

/// Maps an arbitrary quickcheck float into `[-1, 1]`.
fn unit(n: f64) -> f64 {
    if n.is_finite() {
        (n % 1000.0) / 1000.0
    } else {
        0.0
    }
}

#[quickcheck]
fn back_projection_recovers_projected_points(
    angles: (f64, f64, f64),
    translation: (f64, f64, f64),
    point: (f64, f64, f64),
) -> bool {
    let intrinsics = CameraIntrinsics::pinhole(577.6, 578.7, 318.9, 242.7);
    let size = ImageSize::new(640, 480);
    let pose = WorldToCamera::from_parts(
        Vector3::new(unit(translation.0), unit(translation.1), unit(translation.2)),
        Rotation3::from_euler_angles(unit(angles.0), unit(angles.1), unit(angles.2)),
    );
    let world = WorldPoint(Point3::new(
        2.0 * unit(point.0),
        2.0 * unit(point.1),
        4.0 + 3.0 * unit(point.2),
    ));

    let projection = project_to_image(&[world], pose, &intrinsics, size, EPS, 1);
    if !projection.valid[0] {
        // Nothing to check for points that leave the image.
        return true;
    }
    let depth = pose.transform(world).depth();
    let back = back_project(&projection.keypoints, pose, &[depth], &intrinsics);
    (back[0].0 - world.0).norm() < TOLERANCE
}

#[test]
fn points_behind_camera_never_project() {
    let intrinsics = CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0);
    let points: Vec<WorldPoint> = (0..20)
        .map(|i| WorldPoint(Point3::new(0.01 * i as f64, 0.0, -1.0 - i as f64)))
        .collect();
    let projection = project_to_image(
        &points,
        WorldToCamera::identity(),
        &intrinsics,
        ImageSize::new(640, 480),
        EPS,
        1,
    );
    assert!(projection.valid.iter().all(|&valid| !valid));
}
