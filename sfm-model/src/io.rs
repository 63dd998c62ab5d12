use crate::{
    Camera, CameraModelId, Error, Image, Point3D, Reconstruction, Result, TrackElement,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use itertools::Itertools;
use log::*;
use sfm_core::nalgebra::{Point3, Vector3};
use sfm_core::{KeyPoint, WorldPoint, WorldToCamera};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

/// Anything that can load and save a [`Reconstruction`] given a folder.
pub trait ReconstructionStore {
    fn read(&self, path: &Path) -> Result<Reconstruction>;
    fn write(&self, reconstruction: &Reconstruction, path: &Path) -> Result<()>;
}

/// The two on-disk encodings of a COLMAP model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// `cameras.bin`, `images.bin`, `points3D.bin`
    #[default]
    Binary,
    /// `cameras.txt`, `images.txt`, `points3D.txt`
    Text,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Binary => "bin",
            Format::Text => "txt",
        }
    }

    /// Finds which encoding is present in `path`, preferring binary.
    pub fn detect(path: &Path) -> Option<Self> {
        [Format::Binary, Format::Text]
            .into_iter()
            .find(|format| path.join(format!("cameras.{}", format.extension())).is_file())
    }
}

/// Reads COLMAP models in either format and writes them in `format`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColmapStore {
    pub format: Format,
}

impl ColmapStore {
    pub fn new(format: Format) -> Self {
        Self { format }
    }
}

impl ReconstructionStore for ColmapStore {
    fn read(&self, path: &Path) -> Result<Reconstruction> {
        read_model(path)
    }

    fn write(&self, reconstruction: &Reconstruction, path: &Path) -> Result<()> {
        write_model(reconstruction, path, self.format)
    }
}

/// Reads the model in `path`, whichever format it is in.
pub fn read_model(path: &Path) -> Result<Reconstruction> {
    let format = Format::detect(path).ok_or_else(|| Error::Io {
        path: path.join("cameras.bin"),
        source: io::Error::new(io::ErrorKind::NotFound, "no COLMAP model found"),
    })?;
    let file = |table: &str| path.join(format!("{}.{}", table, format.extension()));
    let mut reconstruction = Reconstruction::new();
    match format {
        Format::Binary => {
            for camera in with_path(&file("cameras"), |r| read_cameras_binary(r))? {
                reconstruction.add_camera(camera);
            }
            for image in with_path(&file("images"), |r| read_images_binary(r))? {
                reconstruction.add_image(image);
            }
            for point in with_path(&file("points3D"), |r| read_points3d_binary(r))? {
                reconstruction.add_point3d(point);
            }
        }
        Format::Text => {
            for camera in with_path(&file("cameras"), |r| read_cameras_text(r))? {
                reconstruction.add_camera(camera);
            }
            for image in with_path(&file("images"), |r| read_images_text(r))? {
                reconstruction.add_image(image);
            }
            for point in with_path(&file("points3D"), |r| read_points3d_text(r))? {
                reconstruction.add_point3d(point);
            }
        }
    }
    info!(
        "read {:?} model from {}: {} cameras, {} images, {} points",
        format,
        path.display(),
        reconstruction.cameras.len(),
        reconstruction.images.len(),
        reconstruction.points3d.len()
    );
    Ok(reconstruction)
}

/// Writes the model into `path` (created if needed) in the given format.
pub fn write_model(reconstruction: &Reconstruction, path: &Path, format: Format) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    let file = |table: &str| path.join(format!("{}.{}", table, format.extension()));
    match format {
        Format::Binary => {
            create_with(&file("cameras"), |w| write_cameras_binary(reconstruction, w))?;
            create_with(&file("images"), |w| write_images_binary(reconstruction, w))?;
            create_with(&file("points3D"), |w| write_points3d_binary(reconstruction, w))?;
        }
        Format::Text => {
            create_with(&file("cameras"), |w| write_cameras_text(reconstruction, w))?;
            create_with(&file("images"), |w| write_images_text(reconstruction, w))?;
            create_with(&file("points3D"), |w| write_points3d_text(reconstruction, w))?;
        }
    }
    info!(
        "wrote {:?} model to {}: {} cameras, {} images, {} points",
        format,
        path.display(),
        reconstruction.cameras.len(),
        reconstruction.images.len(),
        reconstruction.points3d.len()
    );
    Ok(())
}

fn path_error(path: &Path, source: io::Error) -> Error {
    let path = path.to_owned();
    if source.kind() == io::ErrorKind::InvalidData {
        Error::Malformed {
            path,
            reason: source.to_string(),
        }
    } else {
        Error::Io { path, source }
    }
}

fn with_path<T>(path: &Path, f: impl FnOnce(&mut BufReader<File>) -> io::Result<T>) -> Result<T> {
    File::open(path)
        .map(BufReader::new)
        .and_then(|mut reader| f(&mut reader))
        .map_err(|source| path_error(path, source))
}

fn create_with(path: &Path, f: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>) -> Result<()> {
    File::create(path)
        .map(BufWriter::new)
        .and_then(|mut writer| {
            f(&mut writer)?;
            writer.flush()
        })
        .map_err(|source| path_error(path, source))
}

fn invalid(reason: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.into())
}

fn to_u32(value: impl TryInto<u32> + Copy + std::fmt::Display, what: &str) -> io::Result<u32> {
    value
        .try_into()
        .map_err(|_| invalid(format!("{} {} is out of range", what, value)))
}

fn check_params(model: CameraModelId, params: &[f64]) -> io::Result<()> {
    if params.len() != model.num_params() {
        return Err(invalid(format!(
            "camera model {} takes {} parameters, found {}",
            model.name(),
            model.num_params(),
            params.len()
        )));
    }
    Ok(())
}

const INVALID_POINT3D_ID: i64 = -1;

fn read_cameras_binary(reader: &mut impl Read) -> io::Result<Vec<Camera>> {
    let count = reader.read_u64::<LittleEndian>()?;
    (0..count)
        .map(|_| {
            let id = to_u32(reader.read_i32::<LittleEndian>()?, "camera id")?;
            let model_id = reader.read_i32::<LittleEndian>()?;
            let model = CameraModelId::from_id(model_id)
                .ok_or_else(|| invalid(format!("unknown camera model id {}", model_id)))?;
            let width = to_u32(reader.read_u64::<LittleEndian>()?, "width")?;
            let height = to_u32(reader.read_u64::<LittleEndian>()?, "height")?;
            let mut params = vec![0.0; model.num_params()];
            reader.read_f64_into::<LittleEndian>(&mut params)?;
            Ok(Camera {
                id,
                model,
                width,
                height,
                params,
            })
        })
        .collect()
}

fn read_images_binary(reader: &mut impl BufRead) -> io::Result<Vec<Image>> {
    let count = reader.read_u64::<LittleEndian>()?;
    (0..count)
        .map(|_| {
            let id = to_u32(reader.read_i32::<LittleEndian>()?, "image id")?;
            let mut qvec = [0.0; 4];
            reader.read_f64_into::<LittleEndian>(&mut qvec)?;
            let mut tvec = [0.0; 3];
            reader.read_f64_into::<LittleEndian>(&mut tvec)?;
            let camera_id = to_u32(reader.read_i32::<LittleEndian>()?, "camera id")?;
            let mut name = vec![];
            reader.read_until(0, &mut name)?;
            if name.pop() != Some(0) {
                return Err(invalid("image name is not null terminated"));
            }
            let name = String::from_utf8(name).map_err(|e| invalid(e.to_string()))?;
            let num_points2d = reader.read_u64::<LittleEndian>()?;
            let mut image = Image::new(
                id,
                name,
                camera_id,
                WorldToCamera::from_qvec_tvec(qvec, Vector3::from(tvec)),
            );
            for _ in 0..num_points2d {
                let x = reader.read_f64::<LittleEndian>()?;
                let y = reader.read_f64::<LittleEndian>()?;
                let point3d_id = reader.read_i64::<LittleEndian>()?;
                image.points2d.push(KeyPoint::new(x, y));
                image
                    .point3d_ids
                    .push((point3d_id != INVALID_POINT3D_ID).then(|| point3d_id as u64));
            }
            Ok(image)
        })
        .collect()
}

fn read_points3d_binary(reader: &mut impl Read) -> io::Result<Vec<Point3D>> {
    let count = reader.read_u64::<LittleEndian>()?;
    (0..count)
        .map(|_| {
            let id = reader.read_u64::<LittleEndian>()?;
            let mut xyz = [0.0; 3];
            reader.read_f64_into::<LittleEndian>(&mut xyz)?;
            let mut rgb = [0; 3];
            reader.read_exact(&mut rgb)?;
            let error = reader.read_f64::<LittleEndian>()?;
            let track_length = reader.read_u64::<LittleEndian>()?;
            let track = (0..track_length)
                .map(|_| {
                    Ok(TrackElement {
                        image_id: to_u32(reader.read_i32::<LittleEndian>()?, "image id")?,
                        point2d_idx: to_u32(reader.read_i32::<LittleEndian>()?, "point2D index")?,
                    })
                })
                .collect::<io::Result<_>>()?;
            Ok(Point3D {
                id,
                xyz: WorldPoint(Point3::from(xyz)),
                rgb,
                error,
                track,
            })
        })
        .collect()
}

fn write_cameras_binary(reconstruction: &Reconstruction, writer: &mut impl Write) -> io::Result<()> {
    writer.write_u64::<LittleEndian>(reconstruction.cameras.len() as u64)?;
    for camera in reconstruction.cameras.values() {
        check_params(camera.model, &camera.params)?;
        writer.write_i32::<LittleEndian>(camera.id as i32)?;
        writer.write_i32::<LittleEndian>(camera.model.id())?;
        writer.write_u64::<LittleEndian>(camera.width as u64)?;
        writer.write_u64::<LittleEndian>(camera.height as u64)?;
        for &param in &camera.params {
            writer.write_f64::<LittleEndian>(param)?;
        }
    }
    Ok(())
}

fn write_images_binary(reconstruction: &Reconstruction, writer: &mut impl Write) -> io::Result<()> {
    writer.write_u64::<LittleEndian>(reconstruction.images.len() as u64)?;
    for image in reconstruction.images.values() {
        writer.write_i32::<LittleEndian>(image.id as i32)?;
        for n in image.pose.qvec() {
            writer.write_f64::<LittleEndian>(n)?;
        }
        for &n in image.pose.tvec().iter() {
            writer.write_f64::<LittleEndian>(n)?;
        }
        writer.write_i32::<LittleEndian>(image.camera_id as i32)?;
        writer.write_all(image.name.as_bytes())?;
        writer.write_u8(0)?;
        writer.write_u64::<LittleEndian>(image.points2d.len() as u64)?;
        for (keypoint, point3d_id) in image.points2d.iter().zip(&image.point3d_ids) {
            writer.write_f64::<LittleEndian>(keypoint.x)?;
            writer.write_f64::<LittleEndian>(keypoint.y)?;
            writer.write_i64::<LittleEndian>(point3d_id.map_or(INVALID_POINT3D_ID, |id| id as i64))?;
        }
    }
    Ok(())
}

fn write_points3d_binary(reconstruction: &Reconstruction, writer: &mut impl Write) -> io::Result<()> {
    writer.write_u64::<LittleEndian>(reconstruction.points3d.len() as u64)?;
    for point in reconstruction.points3d.values() {
        writer.write_u64::<LittleEndian>(point.id)?;
        for &n in point.xyz.coords.iter() {
            writer.write_f64::<LittleEndian>(n)?;
        }
        writer.write_all(&point.rgb)?;
        writer.write_f64::<LittleEndian>(point.error)?;
        writer.write_u64::<LittleEndian>(point.track.len() as u64)?;
        for element in &point.track {
            writer.write_i32::<LittleEndian>(element.image_id as i32)?;
            writer.write_i32::<LittleEndian>(element.point2d_idx as i32)?;
        }
    }
    Ok(())
}

/// Splits a text table into the whitespace separated tokens of each data line.
///
/// Comment lines start with `#`. Blank lines are kept because the keypoint line of an
/// image without keypoints is blank.
fn data_lines(reader: impl BufRead) -> impl Iterator<Item = io::Result<String>> {
    reader.lines().filter(|line| {
        line.as_ref()
            .map(|line| !line.trim_start().starts_with('#'))
            .unwrap_or(true)
    })
}

fn parse<T: FromStr>(token: Option<&str>, what: &str) -> io::Result<T> {
    let token = token.ok_or_else(|| invalid(format!("missing {}", what)))?;
    token
        .parse()
        .map_err(|_| invalid(format!("invalid {} {:?}", what, token)))
}

fn read_cameras_text(reader: &mut impl BufRead) -> io::Result<Vec<Camera>> {
    let mut cameras = vec![];
    for line in data_lines(reader) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let id = parse(tokens.next(), "camera id")?;
        let model_name: String = parse(tokens.next(), "camera model")?;
        let model = CameraModelId::from_name(&model_name)
            .ok_or_else(|| invalid(format!("unknown camera model {}", model_name)))?;
        let width = parse(tokens.next(), "width")?;
        let height = parse(tokens.next(), "height")?;
        let params = tokens
            .map(|token| parse(Some(token), "camera parameter"))
            .collect::<io::Result<Vec<f64>>>()?;
        check_params(model, &params)?;
        cameras.push(Camera {
            id,
            model,
            width,
            height,
            params,
        });
    }
    Ok(cameras)
}

fn read_images_text(reader: &mut impl BufRead) -> io::Result<Vec<Image>> {
    let mut images = vec![];
    let mut lines = data_lines(reader);
    while let Some(line) = lines.next() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let id = parse(tokens.next(), "image id")?;
        let mut qvec = [0.0; 4];
        for n in &mut qvec {
            *n = parse(tokens.next(), "qvec")?;
        }
        let mut tvec = Vector3::zeros();
        for n in tvec.iter_mut() {
            *n = parse(tokens.next(), "tvec")?;
        }
        let camera_id = parse(tokens.next(), "camera id")?;
        // Names may contain spaces.
        let name = tokens.join(" ");
        if name.is_empty() {
            return Err(invalid(format!("image {} has no name", id)));
        }
        let mut image = Image::new(id, name, camera_id, WorldToCamera::from_qvec_tvec(qvec, tvec));
        let points = lines.next().transpose()?.unwrap_or_default();
        for (x, y, point3d_id) in points.split_whitespace().tuples::<(&str, &str, &str)>() {
            let x = parse(Some(x), "keypoint x")?;
            let y = parse(Some(y), "keypoint y")?;
            let point3d_id: i64 = parse(Some(point3d_id), "point3D id")?;
            image.points2d.push(KeyPoint::new(x, y));
            image
                .point3d_ids
                .push((point3d_id != INVALID_POINT3D_ID).then(|| point3d_id as u64));
        }
        if points.split_whitespace().count() % 3 != 0 {
            return Err(invalid(format!("image {} has a truncated keypoint line", id)));
        }
        images.push(image);
    }
    Ok(images)
}

fn read_points3d_text(reader: &mut impl BufRead) -> io::Result<Vec<Point3D>> {
    let mut points = vec![];
    for line in data_lines(reader) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let id = parse(tokens.next(), "point3D id")?;
        let mut xyz = Point3::origin();
        for n in xyz.coords.iter_mut() {
            *n = parse(tokens.next(), "xyz")?;
        }
        let mut rgb = [0; 3];
        for n in &mut rgb {
            *n = parse(tokens.next(), "rgb")?;
        }
        let error = parse(tokens.next(), "error")?;
        let rest: Vec<&str> = tokens.collect();
        if rest.len() % 2 != 0 {
            return Err(invalid(format!("point {} has a truncated track", id)));
        }
        let track = rest
            .into_iter()
            .tuples::<(&str, &str)>()
            .map(|(image_id, point2d_idx)| {
                Ok(TrackElement {
                    image_id: parse(Some(image_id), "track image id")?,
                    point2d_idx: parse(Some(point2d_idx), "track point2D index")?,
                })
            })
            .collect::<io::Result<_>>()?;
        points.push(Point3D {
            id,
            xyz: WorldPoint(xyz),
            rgb,
            error,
            track,
        });
    }
    Ok(points)
}

fn write_cameras_text(reconstruction: &Reconstruction, writer: &mut impl Write) -> io::Result<()> {
    writeln!(writer, "# Camera list with one line of data per camera:")?;
    writeln!(writer, "#   CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]")?;
    writeln!(writer, "# Number of cameras: {}", reconstruction.cameras.len())?;
    for camera in reconstruction.cameras.values() {
        check_params(camera.model, &camera.params)?;
        writeln!(
            writer,
            "{} {} {} {} {}",
            camera.id,
            camera.model.name(),
            camera.width,
            camera.height,
            camera.params.iter().join(" ")
        )?;
    }
    Ok(())
}

fn write_images_text(reconstruction: &Reconstruction, writer: &mut impl Write) -> io::Result<()> {
    let mean_observations = if reconstruction.images.is_empty() {
        0.0
    } else {
        reconstruction
            .images
            .values()
            .map(|image| image.num_points3d())
            .sum::<usize>() as f64
            / reconstruction.images.len() as f64
    };
    writeln!(writer, "# Image list with two lines of data per image:")?;
    writeln!(writer, "#   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME")?;
    writeln!(writer, "#   POINTS2D[] as (X, Y, POINT3D_ID)")?;
    writeln!(
        writer,
        "# Number of images: {}, mean observations per image: {}",
        reconstruction.images.len(),
        mean_observations
    )?;
    for image in reconstruction.images.values() {
        writeln!(
            writer,
            "{} {} {} {} {}",
            image.id,
            image.pose.qvec().iter().join(" "),
            image.pose.tvec().iter().join(" "),
            image.camera_id,
            image.name
        )?;
        let points = image
            .points2d
            .iter()
            .zip(&image.point3d_ids)
            .map(|(keypoint, point3d_id)| {
                format!(
                    "{} {} {}",
                    keypoint.x,
                    keypoint.y,
                    point3d_id.map_or(INVALID_POINT3D_ID, |id| id as i64)
                )
            })
            .join(" ");
        writeln!(writer, "{}", points)?;
    }
    Ok(())
}

fn write_points3d_text(reconstruction: &Reconstruction, writer: &mut impl Write) -> io::Result<()> {
    writeln!(writer, "# 3D point list with one line of data per point:")?;
    writeln!(writer, "#   POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)")?;
    writeln!(
        writer,
        "# Number of points: {}, mean track length: {}",
        reconstruction.points3d.len(),
        if reconstruction.points3d.is_empty() {
            0.0
        } else {
            reconstruction.num_observations() as f64 / reconstruction.points3d.len() as f64
        }
    )?;
    for point in reconstruction.points3d.values() {
        let mut line = format!(
            "{} {} {} {}",
            point.id,
            point.xyz.coords.iter().join(" "),
            point.rgb.iter().join(" "),
            point.error
        );
        for element in &point.track {
            line.push_str(&format!(" {} {}", element.image_id, element.point2d_idx));
        }
        writeln!(writer, "{}", line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_image_names_keep_spaces() {
        let text = "# comment\n1 1 0 0 0 0.5 0 0 2 my image.jpg\n1.5 2.5 -1 3 4 9\n";
        let images = read_images_text(&mut text.as_bytes()).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].name, "my image.jpg");
        assert_eq!(images[0].point3d_ids, vec![None, Some(9)]);
        assert_eq!(images[0].points2d[1], KeyPoint::new(3.0, 4.0));
    }

    #[test]
    fn image_without_keypoints_has_blank_line() {
        let text = "1 1 0 0 0 0 0 0 2 a.jpg\n\n2 1 0 0 0 0 0 0 2 b.jpg\n0 0 -1\n";
        let images = read_images_text(&mut text.as_bytes()).unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].points2d.is_empty());
        assert_eq!(images[1].points2d.len(), 1);
    }

    #[test]
    fn wrong_parameter_count_is_malformed() {
        let text = "1 PINHOLE 640 480 500 500 320\n";
        let error = read_cameras_text(&mut text.as_bytes()).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unknown_model_name_is_malformed() {
        let text = "1 FISHEYE_42 640 480 500\n";
        let error = read_cameras_text(&mut text.as_bytes()).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_binary_is_an_error() {
        let mut bytes = vec![];
        bytes.write_u64::<LittleEndian>(2).unwrap();
        assert!(read_points3d_binary(&mut bytes.as_slice()).is_err());
    }
}
