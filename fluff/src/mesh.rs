use std::collections::HashMap;
use std::f32::consts::{PI, TAU};
use glam::{Vec2, Vec3};
use obj::{Obj, TexturedVertex};
use serde::{Serialize, Deserialize};
use crate::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
  pub pos: Vec3,
  pub normal: Vec3,
  pub uv: Vec2,
}

/// Unindexed triangle list: every three consecutive entries form one triangle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TriangleSoup {
  pub positions: Vec<Vec3>,
  pub uvs: Vec<Vec2>,
  pub normals: Vec<Vec3>,
}

impl TriangleSoup {
  pub fn new(positions: Vec<Vec3>, uvs: Vec<Vec2>, normals: Vec<Vec3>) -> Result<Self, LoadError> {
    if positions.len() != uvs.len() || positions.len() != normals.len() {
      return Err(LoadError::Geometry(format!(
        "stream lengths differ ({} positions, {} uvs, {} normals)",
        positions.len(),
        uvs.len(),
        normals.len()
      )));
    }
    if positions.is_empty() {
      return Err(LoadError::Geometry("no triangles".into()));
    }
    if positions.len() % 3 != 0 {
      return Err(LoadError::Geometry(format!(
        "{} vertices is not a whole number of triangles",
        positions.len()
      )));
    }
    Ok(Self {
      positions,
      uvs,
      normals,
    })
  }

  pub fn from_vertices(verts: impl IntoIterator<Item = Vertex>) -> Result<Self, LoadError> {
    let (mut positions, mut uvs, mut normals) = (vec![], vec![], vec![]);
    for v in verts {
      positions.push(v.pos);
      uvs.push(v.uv);
      normals.push(v.normal);
    }
    Self::new(positions, uvs, normals)
  }

  /// Parses Wavefront OBJ data, flipping V so textures are not upside down.
  pub fn from_obj(data: &[u8]) -> Result<Self, LoadError> {
    let obj: Obj<TexturedVertex, u32> = obj::load_obj(data)?;
    Self::from_vertices(obj.indices.iter().map(|&i| {
      let v = &obj.vertices[i as usize];
      Vertex {
        pos: v.position.into(),
        normal: v.normal.into(),
        uv: Vec2::new(v.texture[0], 1.0 - v.texture[1]),
      }
    }))
  }

  /// UV sphere, wound counter-clockwise when seen from outside.
  pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let point = |ring: u32, segment: u32| {
      let u = segment as f32 / segments as f32;
      let v = ring as f32 / rings as f32;
      let (phi, theta) = (v * PI, u * TAU);
      let normal = match ring {
        0 => Vec3::Y,
        r if r == rings => Vec3::NEG_Y,
        _ => Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin()),
      };
      Vertex {
        pos: normal * radius,
        normal,
        uv: Vec2::new(u, v),
      }
    };
    let mut soup = Self::default();
    for ring in 0..rings {
      for segment in 0..segments {
        let (a, b) = (point(ring, segment), point(ring, segment + 1));
        let (c, d) = (point(ring + 1, segment), point(ring + 1, segment + 1));
        for v in [a, b, c, b, d, c] {
          soup.positions.push(v.pos);
          soup.uvs.push(v.uv);
          soup.normals.push(v.normal);
        }
      }
    }
    soup
  }

  pub fn len(&self) -> usize {
    self.positions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.positions.is_empty()
  }

  pub fn triangle_count(&self) -> usize {
    self.positions.len() / 3
  }

  pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
    self
      .positions
      .iter()
      .zip(&self.uvs)
      .zip(&self.normals)
      .map(|((&pos, &uv), &normal)| Vertex { pos, normal, uv })
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
  pub normal: Vec3,
  pub verts: [u32; 3],
}

/// Welded mesh: coincident positions share one vertex, which keeps the
/// normal and uv of its first occurrence.
#[derive(Debug, Clone, Default)]
pub struct IndexedMesh {
  unique: HashMap<[u32; 3], u32>,
  verts: Vec<Vertex>,
  faces: Vec<Face>,
}

impl IndexedMesh {
  pub fn from_soup(soup: &TriangleSoup) -> Self {
    let mut mesh = Self::default();
    let verts: Vec<_> = soup.vertices().collect();
    for tri in verts.chunks_exact(3) {
      mesh.add_face([tri[0], tri[1], tri[2]]);
    }
    mesh
  }

  pub fn add_face(&mut self, tri: [Vertex; 3]) {
    let verts = tri.map(|v| self.add_vertex(v));
    let mut face = Face {
      normal: Vec3::ZERO,
      verts,
    };
    face.normal = self.face_normal(&face);
    self.faces.push(face);
  }

  /// Returns the index of the vertex at `v.pos`, inserting it if it is new.
  /// Positions compare by value, so `-0.0` and `0.0` weld.
  pub fn add_vertex(&mut self, v: Vertex) -> u32 {
    let key = (v.pos + Vec3::ZERO).to_array().map(f32::to_bits);
    let next = self.verts.len() as u32;
    *self.unique.entry(key).or_insert_with(|| {
      self.verts.push(v);
      next
    })
  }

  pub fn face_normal(&self, face: &Face) -> Vec3 {
    let [a, b, c] = face.verts.map(|i| self.verts[i as usize].pos);
    (b - a).cross(c - a).normalize_or_zero()
  }

  pub fn verts(&self) -> &[Vertex] {
    &self.verts
  }

  pub fn faces(&self) -> &[Face] {
    &self.faces
  }

  /// Expands the faces back into render-ready triangle soup.
  pub fn to_soup(&self) -> Result<TriangleSoup, LoadError> {
    TriangleSoup::from_vertices(
      self
        .faces
        .iter()
        .flat_map(|f| f.verts)
        .map(|i| self.verts[i as usize]),
    )
  }
}

/// How a loaded triangle list becomes render geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ingestion {
  #[default]
  Soup,
  Indexed,
}

impl Ingestion {
  pub fn apply(self, soup: TriangleSoup) -> Result<TriangleSoup, LoadError> {
    match self {
      Self::Soup => Ok(soup),
      Self::Indexed => IndexedMesh::from_soup(&soup).to_soup(),
    }
  }
}
