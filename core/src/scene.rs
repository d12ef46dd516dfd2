use std::collections::HashMap;

use ultraviolet::{
	rotor::Rotor3,
	vec::{
		Vec3,
		Vec4
	}
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MatPropValueID {
	Diffuse,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MatPropValue {
	Text(String),
}

/// [`HashMap`] type alias for material properties
pub type MaterialPropertyMap = HashMap<MatPropValueID, MatPropValue>;

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
	pub name: String,
	pub properties: MaterialPropertyMap,
	pub shader: Option<String>,
}

impl Material {
	pub fn new(name: &str) -> Material {
		Material {
			name: name.to_string(),
			properties: MaterialPropertyMap::new(),
			shader: None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UpAxis {
	Y,
	Z,
}

/// Node identification type
#[derive(Clone, Debug, PartialEq)]
pub enum ObjRef {
	Name(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeData {
	Geometry(Mesh),
	Null,
}

/// Base type of the 3D environment
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
	pub id: ObjRef,
	pub parent: Option<usize>,
	pub children: Vec<Node>,
	pub data: NodeData,
	pub translation: Vec3,
	pub rotation: Rotor3,
}

impl Node {
	pub fn new(id: ObjRef, parent: Option<usize>) -> Node {
		Node {
			id: id,
			parent: parent,
			children: vec![],
			data: NodeData::Null,
			translation: Vec3::zero(),
			rotation: Rotor3::identity(),
		}
	}

	/// Looks up a direct child by name
	pub fn child(&self, name: &str) -> Option<&Node> {
		self.children.iter().find(|c| matches!(&c.id, ObjRef::Name(n) if n == name))
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
	pub position: Vec4,
	pub normal: Option<Vec3>,
	pub uvw: Vec<Vec3>,
}

impl Vertex {
	pub fn new() -> Vertex {
		Vertex {
			position: Vec4::new(0.0, 0.0, 0.0, 1.0),
			normal: None,
			uvw: vec![],
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Face {
	Triangle([usize; 3]),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
	pub vertices: Vec<Vertex>,
	pub faces: Vec<Face>,
	/// Index into [`Scene::materials`]
	pub material: Option<usize>,
}

/// Top level of the 3D environment
#[derive(Clone, Debug)]
pub struct Scene {
	pub root: Node,
	pub materials: Vec<Material>,
	pub up: UpAxis,
}

impl Scene {
	pub fn new(root: Node) -> Scene {
		Scene {
			root: root,
			materials: vec![],
			up: UpAxis::Y,
		}
	}

	/// Returns the index of the material with the given name, if present
	pub fn find_material(&self, name: &str) -> Option<usize> {
		self.materials.iter().position(|m| m.name == name)
	}
}

/// Builds a rotor from a quaternion stored as `(x, y, z, w)`
pub fn vec4_to_rot3(v: Vec4) -> Rotor3 {
	Rotor3::from_quaternion_array([v.x, v.y, v.z, v.w])
}
