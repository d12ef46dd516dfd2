use bitflags::bitflags;

use std::f64::consts::PI;

use ultraviolet::vec::{
	Vec2,
	Vec3
};

#[cfg(feature = "import")]
use byteorder::{
	LE,
	ReadBytesExt
};

#[cfg(feature = "import")]
use md3kit_core::io_ext::ReadBinExt;

#[cfg(feature = "import")]
use import::Md3ImportError;

pub const MAGIC: &str = "IDP3";
pub const MAX_VERSION: i32 = 15;
pub const MAX_QPATH: usize = 64;
pub const MAX_FRAME_NAME: usize = 16;

pub const HEADER_SIZE: usize = 108;
pub const SURFACE_HEADER_SIZE: usize = 108;
pub const FRAME_SIZE: usize = 56;
pub const TAG_SIZE: usize = 112;
pub const TRIANGLE_SIZE: usize = 12;
pub const TEXCOORD_SIZE: usize = 8;
pub const SHADER_SIZE: usize = 68;
pub const VERTEX_SIZE: usize = 8;

/// Scale of the 16 bit fixed-point vertex coordinates
pub const XYZ_SCALE: f32 = 1.0 / 64.0;

bitflags! {
	/// Model level sections which failed to decode
	pub struct ModelSections: u32 {
		const FRAMES = 1;
		const TAGS = 2;
	}

	/// Surface sections which failed to decode
	pub struct SurfaceSections: u32 {
		const TRIANGLES = 1;
		const TEXCOORDS = 2;
		const SHADERS = 4;
		const VERTICES = 8;
	}
}

/// Converts a fixed-point coordinate into a float
pub fn fixed_to_f32(v: i16) -> f32 {
	(v as f32) * XYZ_SCALE
}

/// Expands a normal stored as two angles (zenith, azimuth) into a unit vector
pub fn decode_normal(zenith: u8, azimuth: u8) -> Vec3 {
	let lat = (zenith as f64) * (PI * 2.0) / 255.0;
	let lng = (azimuth as f64) * (PI * 2.0) / 255.0;
	let lat_sin = lat.sin();

	Vec3::new((lng.cos() * lat_sin) as f32, (lng.sin() * lat_sin) as f32, lat.cos() as f32)
}

/// File header, all offsets are absolute
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
	pub ident: String,
	pub version: i32,
	pub name: String,
	pub flags: i32, // unused
	pub num_frames: i32,
	pub num_tags: i32,
	pub num_surfaces: i32,
	pub num_skins: i32, // unused
	pub ofs_frames: i32,
	pub ofs_tags: i32,
	pub ofs_surfaces: i32,
	pub ofs_eof: i32,
}

impl Header {
	#[cfg(feature = "import")]
	pub fn read<R>(buf: &mut R) -> Result<Header, Md3ImportError>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let ident = buf.read_fixed_str(4)?;
		if ident != MAGIC {
			return Err(Md3ImportError::Magic(ident));
		}

		let version = buf.read_i32::<LE>()?;
		if version > MAX_VERSION {
			return Err(Md3ImportError::Version(version));
		}

		let header = Header {
			ident: ident,
			version: version,
			name: buf.read_name(MAX_QPATH)?,
			flags: buf.read_i32::<LE>()?,
			num_frames: buf.read_i32::<LE>()?,
			num_tags: buf.read_i32::<LE>()?,
			num_surfaces: buf.read_i32::<LE>()?,
			num_skins: buf.read_i32::<LE>()?,
			ofs_frames: buf.read_i32::<LE>()?,
			ofs_tags: buf.read_i32::<LE>()?,
			ofs_surfaces: buf.read_i32::<LE>()?,
			ofs_eof: buf.read_i32::<LE>()?,
		};

		import::count("frame count", header.num_frames)?;
		import::count("tag count", header.num_tags)?;
		import::count("surface count", header.num_surfaces)?;

		Ok(header)
	}
}

/// Surface sub-header, all offsets are relative to the surface's own start
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceHeader {
	pub ident: String,
	pub name: String,
	pub flags: i32, // unused
	pub num_frames: i32,
	pub num_shaders: i32,
	pub num_verts: i32,
	pub num_triangles: i32,
	pub ofs_triangles: i32,
	pub ofs_shaders: i32,
	pub ofs_st: i32,
	pub ofs_xyz_normal: i32,
	pub ofs_end: i32,
}

impl SurfaceHeader {
	#[cfg(feature = "import")]
	pub fn read<R>(buf: &mut R) -> Result<SurfaceHeader, Md3ImportError>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let ident = buf.read_fixed_str(4)?;
		if ident != MAGIC {
			return Err(Md3ImportError::Magic(ident));
		}

		let header = SurfaceHeader {
			ident: ident,
			name: buf.read_name(MAX_QPATH)?,
			flags: buf.read_i32::<LE>()?,
			num_frames: buf.read_i32::<LE>()?,
			num_shaders: buf.read_i32::<LE>()?,
			num_verts: buf.read_i32::<LE>()?,
			num_triangles: buf.read_i32::<LE>()?,
			ofs_triangles: buf.read_i32::<LE>()?,
			ofs_shaders: buf.read_i32::<LE>()?,
			ofs_st: buf.read_i32::<LE>()?,
			ofs_xyz_normal: buf.read_i32::<LE>()?,
			ofs_end: buf.read_i32::<LE>()?,
		};

		import::count("surface frame count", header.num_frames)?;
		import::count("shader count", header.num_shaders)?;
		import::count("vertex count", header.num_verts)?;
		import::count("triangle count", header.num_triangles)?;

		Ok(header)
	}
}

/// Bounding metadata of one animation frame
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
	pub name: String,
	pub min: Vec3,
	pub max: Vec3,
	pub origin: Vec3,
	pub radius: f32,
}

impl Frame {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Frame, Md3ImportError>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		Ok(Frame {
			name: buf.read_name(MAX_FRAME_NAME)?,
			min: buf.read_vec3_le()?,
			max: buf.read_vec3_le()?,
			origin: buf.read_vec3_le()?,
			radius: buf.read_f32::<LE>()?,
		})
	}
}

/// Position and orientation of a tag in one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TagTransform {
	pub origin: Vec3,
	pub axis: [Vec3; 3],
}

impl TagTransform {
	/// Reads one flat tag record, returning the tag name with its transform
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<(String, TagTransform), Md3ImportError>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let name = buf.read_name(MAX_QPATH)?;

		Ok((name, TagTransform {
			origin: buf.read_vec3_le()?,
			axis: [buf.read_vec3_le()?, buf.read_vec3_le()?, buf.read_vec3_le()?],
		}))
	}
}

/// Named attachment point, holding one transform per animation frame
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
	pub name: String,
	pub transforms: Vec<TagTransform>,
}

impl Tag {
	pub fn new(name: &str) -> Tag {
		Tag {
			name: name.to_string(),
			transforms: vec![],
		}
	}

	pub fn transform(&self, frame: usize) -> Option<&TagTransform> {
		self.transforms.get(frame)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
	pub indices: [i32; 3],
}

impl Triangle {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Triangle, Md3ImportError>
	where
		R: ReadBytesExt,
	{
		Ok(Triangle {
			indices: [buf.read_i32::<LE>()?, buf.read_i32::<LE>()?, buf.read_i32::<LE>()?],
		})
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
	pub position: Vec3,
	pub normal: Vec3,
}

impl Vertex {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Vertex, Md3ImportError>
	where
		R: ReadBytesExt,
	{
		let position = Vec3::new(fixed_to_f32(buf.read_i16::<LE>()?), fixed_to_f32(buf.read_i16::<LE>()?),
			fixed_to_f32(buf.read_i16::<LE>()?));
		let zenith = buf.read_u8()?;
		let azimuth = buf.read_u8()?;

		Ok(Vertex {
			position: position,
			normal: decode_normal(zenith, azimuth),
		})
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Shader {
	pub name: String,
	pub index: i32,
}

impl Shader {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Shader, Md3ImportError>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		Ok(Shader {
			name: buf.read_name(MAX_QPATH)?,
			index: buf.read_i32::<LE>()?,
		})
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
	pub name: String,
	/// Taken from the surface header, normally equal to the model's frame count
	pub num_frames: usize,
	pub num_vertices: usize,
	/// One vertex array per animation frame present in the file, none when the surface has no vertices
	pub frames: Vec<Vec<Vertex>>,
	pub triangles: Vec<Triangle>,
	pub texcoords: Vec<Vec2>,
	pub shaders: Vec<Shader>,
	pub failed: SurfaceSections,
}

impl Surface {
	pub fn num_frames(&self) -> usize {
		self.num_frames
	}

	pub fn num_vertices(&self) -> usize {
		self.num_vertices
	}

	pub fn num_triangles(&self) -> usize {
		self.triangles.len()
	}

	pub fn num_shaders(&self) -> usize {
		self.shaders.len()
	}

	pub fn vertices(&self, frame: usize) -> Option<&[Vertex]> {
		self.frames.get(frame).map(|v| v.as_slice())
	}

	pub fn vertex(&self, frame: usize, index: usize) -> Option<&Vertex> {
		self.frames.get(frame)?.get(index)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Model {
	pub name: String,
	pub frames: Vec<Frame>,
	pub tags: Vec<Tag>,
	pub surfaces: Vec<Surface>,
	pub failed: ModelSections,
}

impl Model {
	pub fn num_frames(&self) -> usize {
		self.frames.len()
	}

	pub fn num_tags(&self) -> usize {
		self.tags.len()
	}

	pub fn num_surfaces(&self) -> usize {
		self.surfaces.len()
	}

	pub fn frame(&self, index: usize) -> Option<&Frame> {
		self.frames.get(index)
	}

	pub fn tag(&self, index: usize) -> Option<&Tag> {
		self.tags.get(index)
	}

	pub fn tag_by_name(&self, name: &str) -> Option<&Tag> {
		self.tags.iter().find(|t| t.name == name)
	}

	pub fn surface(&self, index: usize) -> Option<&Surface> {
		self.surfaces.get(index)
	}

	/// True when no model or surface section failed to decode
	pub fn is_complete(&self) -> bool {
		self.failed.is_empty() && self.surfaces.iter().all(|s| s.failed.is_empty())
	}
}

#[cfg(feature = "import")]
pub mod import {
	use std::{
		collections::HashMap,
		io
	};

	use log::{
		debug,
		trace,
		warn
	};

	use rayon::prelude::*;
	use thiserror::Error;

	use crate::{
		DecodeCfg,
		DecodeFlag
	};

	use super::*;

	#[derive(Debug, Error)]
	pub enum Md3ImportError {
		#[error("Not an MD3 file: {0:?}")]
		Magic(String),
		#[error("Unknown/unsupported version: {0}/15")]
		Version(i32),
		#[error("Negative {field}: {value}")]
		Count {
			field: &'static str,
			value: i32,
		},
		#[error("Offset {offset} out of range for a {len} byte region")]
		Offset {
			offset: i64,
			len: usize,
		},
		#[error("Truncated data")]
		Truncated {
			source: io::Error,
		},
		#[error("Surface {surface:?} has {found} frames, expected {expected}")]
		FrameCount {
			surface: String,
			expected: usize,
			found: usize,
		},
		#[error("I/O error")]
		IO {
			source: io::Error,
		},
	}

	impl Md3ImportError {
		/// Bad identifier, version or counts
		pub fn is_format_error(&self) -> bool {
			matches!(self, Md3ImportError::Magic(_) | Md3ImportError::Version(_) |
				Md3ImportError::Count { .. } | Md3ImportError::FrameCount { .. })
		}

		pub fn is_truncated(&self) -> bool {
			matches!(self, Md3ImportError::Truncated { .. })
		}
	}

	impl From<io::Error> for Md3ImportError {
		fn from(source: io::Error) -> Self {
			match source.kind() {
				io::ErrorKind::UnexpectedEof => Md3ImportError::Truncated { source: source },
				_ => Md3ImportError::IO { source: source },
			}
		}
	}

	/// Validates a header count
	pub(crate) fn count(field: &'static str, value: i32) -> Result<usize, Md3ImportError> {
		usize::try_from(value).map_err(|_| Md3ImportError::Count {
			field: field,
			value: value,
		})
	}

	/// Returns everything from `offset` to the end of `data`
	fn slice_from(data: &[u8], offset: i64) -> Result<&[u8], Md3ImportError> {
		usize::try_from(offset).ok()
			.and_then(|o| data.get(o..))
			.ok_or(Md3ImportError::Offset {
				offset: offset,
				len: data.len(),
			})
	}

	/// Reads `count` fixed-size records found at `offset` within `data`
	fn section<T, F>(data: &[u8], offset: i32, count: usize, size: usize, mut read: F)
		-> Result<Vec<T>, Md3ImportError>
	where
		F: FnMut(&mut &[u8]) -> Result<T, Md3ImportError>,
	{
		if count == 0 {
			return Ok(vec![]);
		}

		let mut buf = slice_from(data, offset as i64)?;
		let mut records = Vec::with_capacity(count.min(buf.len() / size));

		for _ in 0..count {
			records.push(read(&mut buf)?);
		}

		Ok(records)
	}

	/// Logs a failed section, degrading it to an empty list.
	/// The flag tells whether the section failed.
	fn settle<T>(result: Result<Vec<T>, Md3ImportError>, owner: &str, section: &str) -> (Vec<T>, bool) {
		match result {
			Ok(records) => {
				trace!("Read {} {} of {:?}", records.len(), section, owner);
				(records, false)
			},
			Err(e) => {
				warn!("Error reading {} of {:?}: {}", section, owner, e);
				(vec![], true)
			},
		}
	}

	fn frame_list(data: &[u8], header: &Header) -> Result<Vec<Frame>, Md3ImportError> {
		section(data, header.ofs_frames, header.num_frames as usize, FRAME_SIZE, |buf| Frame::read(buf))
	}

	fn tag_list(data: &[u8], header: &Header) -> Result<Vec<Tag>, Md3ImportError> {
		let count = (header.num_tags as usize).saturating_mul(header.num_frames as usize);
		let records = section(data, header.ofs_tags, count, TAG_SIZE, |buf| TagTransform::read(buf))?;

		Ok(group_tags(records))
	}

	/// Regroups frame-major tag records into one track per name.
	/// Tracks keep first-seen name order, transforms keep record order.
	pub(crate) fn group_tags(records: Vec<(String, TagTransform)>) -> Vec<Tag> {
		let mut index: HashMap<String, usize> = HashMap::new();
		let mut tags: Vec<Tag> = vec![];
		let mut slots = Vec::with_capacity(records.len());

		for (name, _) in records.iter() {
			let slot = match index.get(name) {
				Some(slot) => *slot,
				None => {
					index.insert(name.clone(), tags.len());
					tags.push(Tag::new(name));
					tags.len() - 1
				},
			};
			slots.push(slot);
		}

		for ((_, transform), slot) in records.into_iter().zip(slots) {
			tags[slot].transforms.push(transform);
		}

		tags
	}

	/// Decodes the animation frames of a surface's vertex section in parallel.
	/// Frame `n` starts `n * vertex count * VERTEX_SIZE` bytes into the section,
	/// frames starting past the end of the region are left out.
	fn vertex_frames(data: &[u8], header: &SurfaceHeader)
		-> Result<Vec<Result<Vec<Vertex>, Md3ImportError>>, Md3ImportError>
	{
		let num_frames = header.num_frames as usize;
		let num_verts = header.num_verts as usize;
		if num_frames == 0 || num_verts == 0 {
			return Ok(vec![]);
		}

		let section_data = slice_from(data, header.ofs_xyz_normal as i64)?;
		let stride = num_verts.saturating_mul(VERTEX_SIZE);
		let present = num_frames.min(section_data.len().saturating_add(stride - 1) / stride);

		Ok((0..present).into_par_iter().map(|frame| -> Result<Vec<Vertex>, Md3ImportError> {
			let block = &section_data[frame * stride..];
			let block = &block[..stride.min(block.len())];

			section(block, 0, num_verts, VERTEX_SIZE, |buf| Vertex::read(buf))
		}).collect())
	}

	/// Decodes one surface given its sub-header and its own byte region
	fn surface(header: SurfaceHeader, data: &[u8]) -> Surface {
		let num_verts = header.num_verts as usize;

		let ((triangles, texcoords), (shaders, frames)) = rayon::join(
			|| rayon::join(
				|| section(data, header.ofs_triangles, header.num_triangles as usize, TRIANGLE_SIZE,
					|buf| Triangle::read(buf)),
				|| section(data, header.ofs_st, num_verts, TEXCOORD_SIZE, |buf| Ok(buf.read_vec2_le()?))),
			|| rayon::join(
				|| section(data, header.ofs_shaders, header.num_shaders as usize, SHADER_SIZE,
					|buf| Shader::read(buf)),
				|| vertex_frames(data, &header)));

		let mut failed = SurfaceSections::empty();

		let (triangles, bad) = settle(triangles, &header.name, "triangles");
		failed.set(SurfaceSections::TRIANGLES, bad);

		let (texcoords, bad) = settle(texcoords, &header.name, "texcoords");
		failed.set(SurfaceSections::TEXCOORDS, bad);

		let (shaders, bad) = settle(shaders, &header.name, "shaders");
		failed.set(SurfaceSections::SHADERS, bad);

		let frames: Vec<Vec<Vertex>> = match frames {
			Ok(frames) => frames.into_iter().enumerate().map(|(i, vertices)| {
				let (vertices, bad) = settle(vertices, &header.name, &format!("vertices of frame {}", i));
				if bad {
					failed.insert(SurfaceSections::VERTICES);
				}
				vertices
			}).collect(),
			Err(e) => {
				warn!("Error reading vertices of {:?}: {}", header.name, e);
				failed.insert(SurfaceSections::VERTICES);
				vec![]
			},
		};

		if num_verts > 0 && frames.len() < header.num_frames as usize && !failed.contains(SurfaceSections::VERTICES) {
			warn!("Surface {:?} holds {} of {} vertex frames", header.name, frames.len(), header.num_frames);
			failed.insert(SurfaceSections::VERTICES);
		}

		Surface {
			name: header.name,
			num_frames: header.num_frames as usize,
			num_vertices: num_verts,
			frames: frames,
			triangles: triangles,
			texcoords: texcoords,
			shaders: shaders,
			failed: failed,
		}
	}

	/// Walks the surface region header by header, then decodes every surface in parallel.
	/// A broken sub-header fails the whole list.
	fn surface_list(data: &[u8], header: &Header, cfg: &DecodeCfg) -> Result<Vec<Surface>, Md3ImportError> {
		let count = header.num_surfaces as usize;
		if count == 0 {
			return Ok(vec![]);
		}

		let mut rest = slice_from(data, header.ofs_surfaces as i64)?;
		let mut regions = Vec::with_capacity(count.min(rest.len() / SURFACE_HEADER_SIZE));

		for _ in 0..count {
			let mut cursor = rest;
			let sub = SurfaceHeader::read(&mut cursor)?;
			debug!("Surface {:?}: {} frames, {} vertices, {} triangles, {} shaders", sub.name,
				sub.num_frames, sub.num_verts, sub.num_triangles, sub.num_shaders);

			if sub.num_frames != header.num_frames {
				if cfg.flags.contains(DecodeFlag::STRICT_FRAME_COUNT) {
					return Err(Md3ImportError::FrameCount {
						surface: sub.name,
						expected: header.num_frames as usize,
						found: sub.num_frames as usize,
					});
				}

				warn!("Surface {:?} has {} frames, model has {}", sub.name, sub.num_frames,
					header.num_frames);
			}

			// ofs_end is also the distance to the next sub-header
			if sub.ofs_end <= 0 {
				return Err(Md3ImportError::Offset {
					offset: sub.ofs_end as i64,
					len: rest.len(),
				});
			}

			let (region, next) = rest.split_at((sub.ofs_end as usize).min(rest.len()));
			regions.push((sub, region));
			rest = next;
		}

		Ok(regions.into_par_iter().map(|(h, region)| surface(h, region)).collect())
	}

	/// Decodes an MD3 file with the default configuration
	pub fn decode(data: &[u8]) -> Result<Model, Md3ImportError> {
		decode_with(data, &DecodeCfg::default())
	}

	/// Decodes an MD3 file.
	///
	/// Only header level problems are returned as errors. A section which fails
	/// to decode is left empty and recorded in the `failed` flags of the model
	/// or surface owning it.
	pub fn decode_with(data: &[u8], cfg: &DecodeCfg) -> Result<Model, Md3ImportError> {
		let mut cursor = data;
		let header = Header::read(&mut cursor)?;
		debug!("MD3 {:?} v{}: {} frames, {} tags, {} surfaces", header.name, header.version,
			header.num_frames, header.num_tags, header.num_surfaces);

		let (surfaces, (tags, frames)) = rayon::join(
			|| surface_list(data, &header, cfg),
			|| rayon::join(
				|| tag_list(data, &header),
				|| frame_list(data, &header)));

		let surfaces = surfaces?;
		let mut failed = ModelSections::empty();

		let (frames, bad) = settle(frames, &header.name, "frames");
		failed.set(ModelSections::FRAMES, bad);

		let (tags, bad) = settle(tags, &header.name, "tags");
		failed.set(ModelSections::TAGS, bad);

		Ok(Model {
			name: header.name,
			frames: frames,
			tags: tags,
			surfaces: surfaces,
			failed: failed,
		})
	}

}
