use crate::{CameraPoint, WorldPoint};
use derive_more::{AsMut, AsRef, From, Into};
use nalgebra::{
    IsometryMatrix3, Matrix3, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion,
    Vector3,
};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This trait is implemented by the poses in this library:
///
/// * [`WorldToCamera`] - Transforms [`WorldPoint`] into [`CameraPoint`]
/// * [`CameraToWorld`] - Transforms [`CameraPoint`] into [`WorldPoint`]
pub trait Pose: From<IsometryMatrix3<f64>> + Clone + Copy {
    type InputPoint;
    type OutputPoint;
    type Inverse: Pose;

    /// Retrieve the isometry.
    fn isometry(self) -> IsometryMatrix3<f64>;

    /// Transform the given point to an output point.
    fn transform(self, input: Self::InputPoint) -> Self::OutputPoint;

    /// Creates a pose with no change in position or orientation.
    fn identity() -> Self {
        IsometryMatrix3::identity().into()
    }

    /// Takes the inverse of the pose.
    fn inverse(self) -> Self::Inverse {
        self.isometry().inverse().into()
    }

    /// Create the pose from rotation and translation.
    fn from_parts(translation: Vector3<f64>, rotation: Rotation3<f64>) -> Self {
        IsometryMatrix3::from_parts(translation.into(), rotation).into()
    }

    /// Retrieve the rotation matrix.
    fn rotation(self) -> Rotation3<f64> {
        self.isometry().rotation
    }

    /// Retrieve the translation vector.
    fn translation(self) -> Vector3<f64> {
        self.isometry().translation.vector
    }

    /// Retrieve the homogeneous matrix.
    fn homogeneous(self) -> Matrix4<f64> {
        self.isometry().to_homogeneous()
    }
}

/// This contains a world pose, which is a pose of the world relative to the camera.
/// This maps [`WorldPoint`] into [`CameraPoint`], changing an absolute position into
/// a vector relative to the camera.
///
/// This is the pose stored with every image of a COLMAP reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WorldToCamera(pub IsometryMatrix3<f64>);

impl Pose for WorldToCamera {
    type InputPoint = WorldPoint;
    type OutputPoint = CameraPoint;
    type Inverse = CameraToWorld;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }

    #[inline(always)]
    fn transform(self, input: WorldPoint) -> CameraPoint {
        CameraPoint(self.0 * input.0)
    }
}

impl WorldToCamera {
    /// Builds the pose from a COLMAP `qvec` (`w, x, y, z`) and `tvec`.
    ///
    /// The quaternion is normalized, so slightly denormalized values read from
    /// text files are accepted.
    pub fn from_qvec_tvec(qvec: [f64; 4], tvec: Vector3<f64>) -> Self {
        let [w, x, y, z] = qvec;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z));
        Self(IsometryMatrix3::from_parts(
            Translation3::from(tvec),
            rotation.to_rotation_matrix(),
        ))
    }

    /// Retrieves the COLMAP `qvec` (`w, x, y, z`) of the rotation with a non-negative `w`.
    pub fn qvec(self) -> [f64; 4] {
        rotation_to_qvec(&self.rotation())
    }

    /// Retrieves the COLMAP `tvec`.
    pub fn tvec(self) -> Vector3<f64> {
        self.0.translation.vector
    }
}

/// This contains a camera pose, which is a pose of the camera relative to the world.
/// This transforms camera points (with depth as `z`) into world coordinates.
/// This also tells you where the camera is located and oriented in the world.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraToWorld(pub IsometryMatrix3<f64>);

impl Pose for CameraToWorld {
    type InputPoint = CameraPoint;
    type OutputPoint = WorldPoint;
    type Inverse = WorldToCamera;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }

    #[inline(always)]
    fn transform(self, input: CameraPoint) -> WorldPoint {
        WorldPoint(self.0 * input.0)
    }
}

impl CameraToWorld {
    /// Builds the pose from a homogeneous camera-to-world matrix such as the
    /// ones shipped with ScanNet (`pose/<frame>.txt`).
    ///
    /// Returns `None` when the matrix has any non-finite entry, which is how
    /// ScanNet marks frames where tracking was lost.
    ///
    /// ```
    /// use sfm_core::{CameraToWorld, Pose};
    /// use sfm_core::nalgebra::Matrix4;
    /// let mut m = Matrix4::identity();
    /// m[(0, 3)] = 2.0;
    /// let pose = CameraToWorld::from_homogeneous(&m).unwrap();
    /// assert_eq!(pose.translation().x, 2.0);
    /// assert!(CameraToWorld::from_homogeneous(&Matrix4::from_element(f64::INFINITY)).is_none());
    /// ```
    pub fn from_homogeneous(matrix: &Matrix4<f64>) -> Option<Self> {
        if matrix.iter().any(|n| !n.is_finite()) {
            return None;
        }
        let rotation: Matrix3<f64> = matrix.fixed_slice::<3, 3>(0, 0).into_owned();
        let translation: Vector3<f64> = matrix.fixed_slice::<3, 1>(0, 3).into_owned();
        // Re-orthonormalize in case the file was written with limited precision.
        let rotation = Rotation3::from_matrix(&rotation);
        Some(Self::from_parts(translation, rotation))
    }
}

/// Converts a rotation matrix into a COLMAP `qvec` (`w, x, y, z`).
///
/// The sign is chosen so that `w >= 0`, matching `rotmat2qvec`.
pub fn rotation_to_qvec(rotation: &Rotation3<f64>) -> [f64; 4] {
    let q = UnitQuaternion::from_rotation_matrix(rotation);
    let q = if q.w < 0.0 { -q.into_inner() } else { q.into_inner() };
    [q.w, q.i, q.j, q.k]
}
