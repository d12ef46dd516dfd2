use std::io::{
	Read,
	Result
};

use ultraviolet::vec::{
	Vec2,
	Vec3
};

pub trait ReadBinExt: Read {
	/// Reads exactly `length` bytes as a string, keeping any padding
	#[inline]
	fn read_fixed_str(&mut self, length: usize) -> Result<String> {
		let mut buf = vec![0; length];
		self.read_exact(&mut buf)?;

		Ok(buf.iter().map(|b| *b as char).collect())
	}

	/// Reads a NUL-padded name occupying exactly `length` bytes.
	/// Everything from the first NUL onwards is dropped.
	#[inline]
	fn read_name(&mut self, length: usize) -> Result<String> {
		let mut buf = vec![0; length];
		self.read_exact(&mut buf)?;

		let end = buf.iter().position(|b| *b == 0).unwrap_or(length);

		Ok(buf[..end].iter().map(|b| *b as char).collect())
	}

	/// Reads a little endian 2D vector
	#[inline]
	fn read_vec2_le(&mut self) -> Result<Vec2> {
		let mut x = [0; 4];
		let mut y = x;

		self.read_exact(&mut x)?;
		self.read_exact(&mut y)?;

		Ok(Vec2::new(f32::from_le_bytes(x), f32::from_le_bytes(y)))
	}

	/// Reads a little endian 3D vector
	#[inline]
	fn read_vec3_le(&mut self) -> Result<Vec3> {
		let mut x = [0; 4];
		let mut y = x;
		let mut z = y;

		self.read_exact(&mut x)?;
		self.read_exact(&mut y)?;
		self.read_exact(&mut z)?;

		Ok(Vec3::new(f32::from_le_bytes(x), f32::from_le_bytes(y), f32::from_le_bytes(z)))
	}
}

impl<R> ReadBinExt for R
where
	R: Read + ?Sized,
{
}
