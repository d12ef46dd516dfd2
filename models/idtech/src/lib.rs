pub mod md3;

#[cfg(test)]
mod fixture;

use bitflags::bitflags;

#[cfg(feature = "import")]
use std::{
	fs,
	path::Path
};

use thiserror::Error;

use ultraviolet::vec::{
	Vec3,
	Vec4
};

use md3kit_core::scene::{
	Face,
	Material,
	MatPropValue,
	MatPropValueID,
	Mesh,
	Node,
	NodeData,
	ObjRef,
	Scene,
	UpAxis,
	Vertex,
	vec4_to_rot3
};

#[cfg(feature = "import")]
use md3::import::Md3ImportError;

use md3::{
	Model,
	Surface,
	TagTransform
};

bitflags! {
	pub struct DecodeFlag: u32 {
		/// Reject surfaces whose frame count differs from the model's
		const STRICT_FRAME_COUNT = 1;
	}

	pub struct SceneFlag: u32 {
		const SWAP_YZ = 1;
		const FLIP_UV_Y = 2;
		const TAGS = 4;
	}
}

impl Default for DecodeFlag {
	fn default() -> Self {
		DecodeFlag::empty()
	}
}

impl Default for SceneFlag {
	fn default() -> Self {
		SceneFlag::SWAP_YZ | SceneFlag::FLIP_UV_Y | SceneFlag::TAGS
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeCfg {
	pub flags: DecodeFlag,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneCfg {
	pub flags: SceneFlag,
	/// Animation frame to pose the scene in
	pub frame: usize,
}

#[derive(Debug, Error)]
pub enum SceneError {
	#[error("Frame {frame} out of range: model has {count} frames")]
	Frame {
		frame: usize,
		count: usize,
	},
}

/// Reads and decodes an MD3 file
#[cfg(feature = "import")]
pub fn load<P>(path: P, cfg: &DecodeCfg) -> Result<Model, Md3ImportError>
where
	P: AsRef<Path>,
{
	let data = fs::read(path)?;
	md3::import::decode_with(&data, cfg)
}

fn swap_yz(v: Vec3, swap: bool) -> Vec3 {
	if swap {
		Vec3::new(v.x, v.z, v.y)
	} else {
		v
	}
}

/// Converts tag axes (the columns of a rotation matrix) into a quaternion `(x, y, z, w)`
fn axes_to_quat(axis: &[Vec3; 3]) -> Vec4 {
	let m = |row: usize, col: usize| match row {
		0 => axis[col].x,
		1 => axis[col].y,
		_ => axis[col].z,
	};

	let trace = m(0, 0) + m(1, 1) + m(2, 2);

	if trace > 0.0 {
		let s = (trace + 1.0).sqrt() * 2.0;
		Vec4::new((m(2, 1) - m(1, 2)) / s, (m(0, 2) - m(2, 0)) / s, (m(1, 0) - m(0, 1)) / s, 0.25 * s)
	} else if m(0, 0) > m(1, 1) && m(0, 0) > m(2, 2) {
		let s = (1.0 + m(0, 0) - m(1, 1) - m(2, 2)).sqrt() * 2.0;
		Vec4::new(0.25 * s, (m(0, 1) + m(1, 0)) / s, (m(0, 2) + m(2, 0)) / s, (m(2, 1) - m(1, 2)) / s)
	} else if m(1, 1) > m(2, 2) {
		let s = (1.0 + m(1, 1) - m(0, 0) - m(2, 2)).sqrt() * 2.0;
		Vec4::new((m(0, 1) + m(1, 0)) / s, 0.25 * s, (m(1, 2) + m(2, 1)) / s, (m(0, 2) - m(2, 0)) / s)
	} else {
		let s = (1.0 + m(2, 2) - m(0, 0) - m(1, 1)).sqrt() * 2.0;
		Vec4::new((m(0, 2) + m(2, 0)) / s, (m(1, 2) + m(2, 1)) / s, 0.25 * s, (m(1, 0) - m(0, 1)) / s)
	}
}

fn tag_node(name: &str, transform: &TagTransform, swap: bool) -> Node {
	let mut axis = transform.axis.map(|a| swap_yz(a, swap));
	if swap {
		axis.swap(1, 2);
	}

	let mut node = Node::new(ObjRef::Name(name.to_string()), Some(0));
	node.translation = swap_yz(transform.origin, swap);
	node.rotation = vec4_to_rot3(axes_to_quat(&axis));

	node
}

fn surface_mesh(surface: &Surface, cfg: &SceneCfg) -> Mesh {
	let swap = cfg.flags.contains(SceneFlag::SWAP_YZ);
	let flip = cfg.flags.contains(SceneFlag::FLIP_UV_Y);
	let mut mesh = Mesh::default();

	for (i, v) in surface.vertices(cfg.frame).unwrap_or(&[]).iter().enumerate() {
		let p = swap_yz(v.position, swap);
		let mut vert = Vertex::new();
		vert.position = Vec4::new(p.x, p.y, p.z, 1.0);
		vert.normal = Some(swap_yz(v.normal, swap));

		if let Some(st) = surface.texcoords.get(i) {
			let t = if flip { 1.0 - st.y } else { st.y };
			vert.uvw.push(Vec3::new(st.x, t, 0.0));
		}

		mesh.vertices.push(vert);
	}

	let num_verts = mesh.vertices.len();

	for tri in surface.triangles.iter() {
		let mut indices = [0usize; 3];
		let mut valid = true;

		for (slot, index) in indices.iter_mut().zip(tri.indices) {
			match usize::try_from(index) {
				Ok(i) if i < num_verts => *slot = i,
				_ => valid = false,
			}
		}

		if !valid {
			continue;
		}

		// Z-up winding is reversed
		if !swap {
			indices.reverse();
		}

		mesh.faces.push(Face::Triangle(indices));
	}

	mesh
}

/// Builds an intermediate scene of one animation frame of the model
pub fn to_scene(model: &Model, cfg: &SceneCfg) -> Result<Scene, SceneError> {
	if cfg.frame >= model.num_frames() {
		return Err(SceneError::Frame {
			frame: cfg.frame,
			count: model.num_frames(),
		});
	}

	let swap = cfg.flags.contains(SceneFlag::SWAP_YZ);
	let mut scene = Scene::new(Node::new(ObjRef::Name(model.name.clone()), None));
	scene.up = if swap { UpAxis::Y } else { UpAxis::Z };

	for surface in model.surfaces.iter() {
		let mut mesh = surface_mesh(surface, cfg);

		for shader in surface.shaders.iter() {
			if scene.find_material(&shader.name).is_none() {
				let mut mat = Material::new(&shader.name);
				mat.shader = Some(shader.name.clone());
				mat.properties.insert(MatPropValueID::Diffuse, MatPropValue::Text(shader.name.clone()));
				scene.materials.push(mat);
			}
		}

		mesh.material = surface.shaders.first().and_then(|s| scene.find_material(&s.name));

		let mut node = Node::new(ObjRef::Name(surface.name.clone()), Some(0));
		node.data = NodeData::Geometry(mesh);
		scene.root.children.push(node);
	}

	if cfg.flags.contains(SceneFlag::TAGS) {
		for tag in model.tags.iter() {
			if let Some(transform) = tag.transform(cfg.frame) {
				scene.root.children.push(tag_node(&tag.name, transform, swap));
			}
		}
	}

	Ok(scene)
}
