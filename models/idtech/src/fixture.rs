//! Synthesises MD3 buffers for tests

use byteorder::{
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use crate::md3::{
	HEADER_SIZE,
	MAX_FRAME_NAME,
	MAX_QPATH,
	SURFACE_HEADER_SIZE
};

pub const HDR_NUM_TAGS: usize = 80;
pub const HDR_OFS_FRAMES: usize = 92;
pub const HDR_OFS_TAGS: usize = 96;
pub const HDR_OFS_SURFACES: usize = 100;

pub const SURF_NUM_FRAMES: usize = 72;
pub const SURF_NUM_VERTS: usize = 80;
pub const SURF_OFS_TRIANGLES: usize = 88;
pub const SURF_OFS_END: usize = 104;

pub fn init() {
	let _ = pretty_env_logger::try_init();
}

pub fn patch_i32(data: &mut [u8], pos: usize, value: i32) {
	data[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn read_i32(data: &[u8], pos: usize) -> i32 {
	(&data[pos..pos + 4]).read_i32::<LE>().unwrap()
}

#[derive(Clone, Debug)]
pub struct FrameDesc {
	pub name: String,
	pub min: [f32; 3],
	pub max: [f32; 3],
	pub origin: [f32; 3],
	pub radius: f32,
}

#[derive(Clone, Debug)]
pub struct TagDesc {
	pub name: String,
	pub origin: [f32; 3],
	pub axis: [[f32; 3]; 3],
}

#[derive(Clone, Debug)]
pub struct SurfaceDesc {
	pub name: String,
	pub num_frames: i32,
	pub num_verts: i32,
	pub shaders: Vec<(String, i32)>,
	pub triangles: Vec<[i32; 3]>,
	pub texcoords: Vec<[f32; 2]>,
	/// Per frame: fixed-point position and (zenith, azimuth)
	pub vertices: Vec<Vec<([i16; 3], [u8; 2])>>,
}

#[derive(Clone, Debug)]
pub struct ModelDesc {
	pub version: i32,
	pub name: String,
	pub frames: Vec<FrameDesc>,
	pub num_tags: i32,
	/// Flat, frame-major
	pub tags: Vec<TagDesc>,
	pub surfaces: Vec<SurfaceDesc>,
}

fn put_name(out: &mut Vec<u8>, name: &str, length: usize) {
	let mut bytes = name.as_bytes().to_vec();
	bytes.resize(length, 0);
	out.extend_from_slice(&bytes);
}

fn put_vec3(out: &mut Vec<u8>, v: [f32; 3]) {
	for c in v {
		out.write_f32::<LE>(c).unwrap();
	}
}

impl SurfaceDesc {
	fn build(&self) -> Vec<u8> {
		let ofs_shaders = SURFACE_HEADER_SIZE;
		let ofs_triangles = ofs_shaders + self.shaders.len() * 68;
		let ofs_st = ofs_triangles + self.triangles.len() * 12;
		let ofs_xyz = ofs_st + self.texcoords.len() * 8;
		let ofs_end = ofs_xyz + self.vertices.iter().map(|f| f.len() * 8).sum::<usize>();

		let mut out = vec![];
		out.extend_from_slice(b"IDP3");
		put_name(&mut out, &self.name, MAX_QPATH);
		for v in [0, self.num_frames, self.shaders.len() as i32, self.num_verts, self.triangles.len() as i32,
			ofs_triangles as i32, ofs_shaders as i32, ofs_st as i32, ofs_xyz as i32, ofs_end as i32] {
			out.write_i32::<LE>(v).unwrap();
		}

		for (name, index) in self.shaders.iter() {
			put_name(&mut out, name, MAX_QPATH);
			out.write_i32::<LE>(*index).unwrap();
		}

		for tri in self.triangles.iter() {
			for i in tri {
				out.write_i32::<LE>(*i).unwrap();
			}
		}

		for st in self.texcoords.iter() {
			out.write_f32::<LE>(st[0]).unwrap();
			out.write_f32::<LE>(st[1]).unwrap();
		}

		for frame in self.vertices.iter() {
			for (pos, normal) in frame.iter() {
				for c in pos {
					out.write_i16::<LE>(*c).unwrap();
				}
				out.extend_from_slice(normal);
			}
		}

		assert_eq!(ofs_end, out.len());
		out
	}
}

impl ModelDesc {
	/// Lays out header, frames, tags and surfaces in that order
	pub fn build(&self) -> Vec<u8> {
		let ofs_frames = HEADER_SIZE;
		let ofs_tags = ofs_frames + self.frames.len() * 56;
		let ofs_surfaces = ofs_tags + self.tags.len() * 112;
		let surfaces: Vec<Vec<u8>> = self.surfaces.iter().map(|s| s.build()).collect();
		let ofs_eof = ofs_surfaces + surfaces.iter().map(|s| s.len()).sum::<usize>();

		let mut out = vec![];
		out.extend_from_slice(b"IDP3");
		out.write_i32::<LE>(self.version).unwrap();
		put_name(&mut out, &self.name, MAX_QPATH);
		for v in [0, self.frames.len() as i32, self.num_tags, self.surfaces.len() as i32, 0,
			ofs_frames as i32, ofs_tags as i32, ofs_surfaces as i32, ofs_eof as i32] {
			out.write_i32::<LE>(v).unwrap();
		}
		assert_eq!(HEADER_SIZE, out.len());

		for frame in self.frames.iter() {
			put_name(&mut out, &frame.name, MAX_FRAME_NAME);
			put_vec3(&mut out, frame.min);
			put_vec3(&mut out, frame.max);
			put_vec3(&mut out, frame.origin);
			out.write_f32::<LE>(frame.radius).unwrap();
		}

		for tag in self.tags.iter() {
			put_name(&mut out, &tag.name, MAX_QPATH);
			put_vec3(&mut out, tag.origin);
			for axis in tag.axis {
				put_vec3(&mut out, axis);
			}
		}

		for surface in surfaces {
			out.extend_from_slice(&surface);
		}

		assert_eq!(ofs_eof, out.len());
		out
	}
}

const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn frame(name: &str, extent: f32, radius: f32) -> FrameDesc {
	FrameDesc {
		name: name.to_string(),
		min: [-extent; 3],
		max: [extent; 3],
		origin: [0.0; 3],
		radius: radius,
	}
}

/// One surface of three vertices over two frames, one tag
pub fn head_model() -> ModelDesc {
	ModelDesc {
		version: 15,
		name: "head".to_string(),
		frames: vec![frame("idle_1", 1.0, 1.5), frame("idle_2", 1.0, 1.5)],
		num_tags: 1,
		tags: vec![
			TagDesc { name: "tag_head".to_string(), origin: [0.0, 0.0, 10.0], axis: IDENTITY },
			TagDesc { name: "tag_head".to_string(), origin: [0.0, 0.0, 11.0], axis: IDENTITY },
		],
		surfaces: vec![SurfaceDesc {
			name: "h_head".to_string(),
			num_frames: 2,
			num_verts: 3,
			shaders: vec![],
			triangles: vec![[0, 1, 2]],
			texcoords: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
			vertices: vec![
				vec![([0, 0, 0], [0, 0]), ([64, 0, 0], [0, 0]), ([0, 64, 0], [0, 0])],
				vec![([0, 0, 64], [0, 0]), ([64, 0, 64], [0, 0]), ([0, 64, 64], [0, 0])],
			],
		}],
	}
}

/// Two surfaces of four vertices over three frames, two tags.
/// Vertex `i` of frame `n` sits at `(i + n, -i, 2.5)`, tag `t` of frame `n` at `(t, n, 0)`.
pub fn sample_model() -> ModelDesc {
	let num_frames = 3;

	let surface = |name: &str, shaders: Vec<(String, i32)>, triangles: Vec<[i32; 3]>| SurfaceDesc {
		name: name.to_string(),
		num_frames: num_frames,
		num_verts: 4,
		shaders: shaders,
		triangles: triangles,
		texcoords: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.75, 0.25]],
		vertices: (0..num_frames as i16).map(|n| {
			(0..4i16).map(|i| ([(i + n) * 64, -i * 64, 160], [0, 0])).collect()
		}).collect(),
	};

	let mut tags = vec![];
	for n in 0..num_frames {
		for (t, name) in ["tag_torso", "tag_weapon"].iter().enumerate() {
			tags.push(TagDesc {
				name: name.to_string(),
				origin: [t as f32, n as f32, 0.0],
				axis: IDENTITY,
			});
		}
	}

	ModelDesc {
		version: 15,
		name: "models/players/sarge/lower".to_string(),
		frames: vec![frame("run_1", 1.0, 2.0), frame("run_2", 1.5, 3.0), frame("run_3", 2.0, 4.5)],
		num_tags: 2,
		tags: tags,
		surfaces: vec![
			surface("u_torso", vec![("models/torso".to_string(), 0)], vec![[0, 1, 2], [2, 3, 0]]),
			surface("l_legs", vec![("models/legs".to_string(), 0), ("models/legs_blue".to_string(), 1)],
				vec![[0, 1, 2], [0, 2, 3]]),
		],
	}
}
