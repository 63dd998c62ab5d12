use approx::assert_relative_eq;
use sfm_core::nalgebra::{Point3, Vector3};
use sfm_core::{KeyPoint, Pose, WorldPoint, WorldToCamera};
use sfm_model::*;
use sfm_pinhole::ImageSize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Three images; point 1 is seen by images 1 and 3, point 2 only by image 3.
fn full_model() -> Reconstruction {
    let mut reconstruction = Reconstruction::new();
    reconstruction.add_camera(Camera::pinhole(0, ImageSize::new(64, 48), 50.0, 50.0, 32.0, 24.0));
    for (id, name) in [(1, "a.jpg"), (2, "b.jpg"), (3, "c.jpg")] {
        let mut image = Image::new(id, name, 0, WorldToCamera::identity());
        image.points2d = vec![KeyPoint::new(1.0, 1.0), KeyPoint::new(2.0, 2.0)];
        image.point3d_ids = match id {
            1 => vec![Some(1), None],
            2 => vec![None, None],
            _ => vec![Some(1), Some(2)],
        };
        reconstruction.add_image(image);
    }
    let point = |id, track: Vec<(ImageId, u32)>| Point3D {
        id,
        xyz: WorldPoint(Point3::new(0.0, 0.0, 1.0)),
        rgb: [0; 3],
        error: 0.0,
        track: track
            .into_iter()
            .map(|(image_id, point2d_idx)| TrackElement {
                image_id,
                point2d_idx,
            })
            .collect(),
    };
    reconstruction.add_point3d(point(1, vec![(1, 0), (3, 0)]));
    reconstruction.add_point3d(point(2, vec![(3, 1)]));
    reconstruction
}

#[test]
fn blacklisted_images_become_queries() {
    let blacklist: HashSet<String> = ["c.jpg".to_owned()].into_iter().collect();
    let (reference, split) = create_reference_sfm(&full_model(), Some(&blacklist));
    assert_eq!(split.train, vec![1, 2]);
    assert_eq!(split.test, vec![3]);
    assert_eq!(reference.images.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(reference.points3d.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(reference.points3d[&1].track.len(), 1);
    reference.sanity_check().unwrap();
}

#[test]
fn no_blacklist_keeps_everything() {
    let full = full_model();
    let (reference, split) = create_reference_sfm(&full, None);
    assert_eq!(reference, full);
    assert!(split.test.is_empty());
}

#[test]
fn reference_from_store_reads_blacklist_file() {
    let dir = tempfile::tempdir().unwrap();
    let full_path = dir.path().join("full");
    let ref_path = dir.path().join("ref");
    let blacklist = dir.path().join("test.txt");
    fs::write(&blacklist, "a.jpg\nc.jpg\n\n").unwrap();
    let store = ColmapStore::default();
    store.write(&full_model(), &full_path).unwrap();

    let split = create_reference_sfm_from_store(&store, &full_path, &ref_path, Some(&blacklist)).unwrap();
    assert_eq!(split.train, vec![2]);
    assert_eq!(split.test, vec![1, 3]);
    let reference = store.read(&ref_path).unwrap();
    assert_eq!(reference.images.len(), 1);
    assert!(reference.points3d.is_empty());
}

fn write_matrix(path: &Path, rows: [[&str; 4]; 4]) {
    let text: String = rows.iter().map(|row| format!("{}\n", row.join(" "))).collect();
    fs::write(path, text).unwrap();
}

#[test]
fn scannet_frames_without_pose_are_skipped() {
    let scene = tempfile::tempdir().unwrap();
    for folder in ["color", "pose", "intrinsic"] {
        fs::create_dir(scene.path().join(folder)).unwrap();
    }
    write_matrix(
        &scene.path().join("intrinsic/intrinsic_color.txt"),
        [
            ["1170.187988", "0.000000", "647.750000", "0.000000"],
            ["0.000000", "1170.187988", "483.750000", "0.000000"],
            ["0.000000", "0.000000", "1.000000", "0.000000"],
            ["0.000000", "0.000000", "0.000000", "1.000000"],
        ],
    );
    let identity = [
        ["1", "0", "0", "0"],
        ["0", "1", "0", "0"],
        ["0", "0", "1", "0"],
        ["0", "0", "0", "1"],
    ];
    let moved = [
        ["1", "0", "0", "2"],
        ["0", "1", "0", "0"],
        ["0", "0", "1", "0"],
        ["0", "0", "0", "1"],
    ];
    let lost = [["-inf"; 4]; 4];
    for (frame, pose) in [(0, identity), (20, moved), (10, lost)] {
        fs::write(scene.path().join(format!("color/{}.jpg", frame)), b"").unwrap();
        write_matrix(&scene.path().join(format!("pose/{}.txt", frame)), pose);
    }

    let reference = scannet_reference(scene.path()).unwrap();
    assert_eq!(reference.missing_poses, 1);
    let reconstruction = reference.reconstruction;
    assert_eq!(reconstruction.images.len(), 2);
    assert!(reconstruction.points3d.is_empty());
    assert_eq!(reconstruction.cameras[&0].model, CameraModelId::Pinhole);
    assert_eq!(reconstruction.cameras[&0].params, vec![1170.187988, 1170.187988, 647.75, 483.75]);
    assert_eq!((reconstruction.cameras[&0].width, reconstruction.cameras[&0].height), (1296, 968));

    let moved = &reconstruction.images[&20];
    assert_eq!(moved.name, "20.jpg");
    assert_eq!(moved.camera_id, 0);
    // The stored pose maps world to camera, so it undoes the camera's translation.
    assert_relative_eq!(moved.pose.translation(), Vector3::new(-2.0, 0.0, 0.0), epsilon = 1e-12);
}

#[test]
fn scannet_requires_numeric_frame_names() {
    let scene = tempfile::tempdir().unwrap();
    for folder in ["color", "pose", "intrinsic"] {
        fs::create_dir(scene.path().join(folder)).unwrap();
    }
    fs::write(
        scene.path().join("intrinsic/intrinsic_color.txt"),
        "1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n",
    )
    .unwrap();
    fs::write(scene.path().join("color/frame.jpg"), b"").unwrap();
    assert!(matches!(
        scannet_reference(scene.path()),
        Err(Error::Malformed { .. })
    ));
}
