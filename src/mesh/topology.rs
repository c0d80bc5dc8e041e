//! Refinement-tree bookkeeping for line and quadrilateral meshes.
//!
//! Cells are never removed from the cell table while they are part of the tree: refining a
//! cell appends its children, and the refined cell stays in the table as an inactive parent.
//! Edges are deduplicated by their (sorted) vertex pair, so that neighboring cells share the
//! same edge entity. Refining an edge inserts a midpoint vertex and two child edges, which are
//! reused by every cell that later refines across the same edge.
use crate::element::{CellGeometry, CellTopology};
use crate::error::MeshTopologyError;
use crate::CellId;
use nalgebra::Point2;
use rustc_hash::FxHashMap;

pub type VertexIndex = usize;
pub type EdgeIndex = usize;

/// Guard against cycles in corrupt refinement trees.
const MAX_TREE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    point: Point2<f64>,
    parent_edge: Option<EdgeIndex>,
}

impl Vertex {
    pub fn point(&self) -> &Point2<f64> {
        &self.point
    }

    /// The edge whose refinement created this vertex as its midpoint, if any.
    pub fn parent_edge(&self) -> Option<EdgeIndex> {
        self.parent_edge
    }
}

/// Position of a child edge inside its parent edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeParent {
    pub edge: EdgeIndex,
    /// Parent parameters of the child's first and second vertex. May be decreasing.
    pub interval: [f64; 2],
}

impl EdgeParent {
    /// Maps a parameter of the child edge into a parameter of the parent edge.
    pub fn map_to_parent(&self, t: f64) -> f64 {
        let [a, b] = self.interval;
        a + 0.5 * (t + 1.0) * (b - a)
    }
}

/// An edge entity. Its parametrization runs from `vertices[0]` (at `-1`) to `vertices[1]`
/// (at `1`), with the vertex indices sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    vertices: [VertexIndex; 2],
    parent: Option<EdgeParent>,
    children: Vec<EdgeIndex>,
    midpoint: Option<VertexIndex>,
}

impl Edge {
    pub fn vertices(&self) -> [VertexIndex; 2] {
        self.vertices
    }

    pub fn parent(&self) -> Option<&EdgeParent> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[EdgeIndex] {
        &self.children
    }

    pub fn midpoint(&self) -> Option<VertexIndex> {
        self.midpoint
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    id: CellId,
    topology: CellTopology,
    vertices: Vec<VertexIndex>,
    sides: Vec<usize>,
    parent: Option<CellId>,
    child_ordinal: Option<usize>,
    children: Vec<CellId>,
    level: usize,
    h1_order: usize,
}

impl Cell {
    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn topology(&self) -> CellTopology {
        self.topology
    }

    /// Vertex indices in the local vertex order of the reference cell.
    pub fn vertices(&self) -> &[VertexIndex] {
        &self.vertices
    }

    /// Side entities: edge indices for quadrilaterals, vertex indices for lines.
    pub fn sides(&self) -> &[usize] {
        &self.sides
    }

    pub fn parent(&self) -> Option<CellId> {
        self.parent
    }

    /// Position of this cell among its parent's children.
    pub fn child_ordinal(&self) -> Option<usize> {
        self.child_ordinal
    }

    pub fn children(&self) -> &[CellId] {
        &self.children
    }

    pub fn is_active(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of refinements separating the cell from its root.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn h1_order(&self) -> usize {
        self.h1_order
    }

    /// Local vertex ordinal of the given vertex, if it is a vertex of this cell.
    pub fn local_vertex(&self, vertex: VertexIndex) -> Option<usize> {
        self.vertices.iter().position(|&v| v == vertex)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshTopology {
    space_dim: usize,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    edge_lookup: FxHashMap<[VertexIndex; 2], EdgeIndex>,
    cells: Vec<Option<Cell>>,
    edge_sides: Vec<Vec<(CellId, usize)>>,
    vertex_cells: Vec<Vec<CellId>>,
}

impl MeshTopology {
    /// Creates a two-dimensional topology from counter-clockwise quadrilaterals.
    pub fn from_quads(
        vertices: Vec<Point2<f64>>,
        quads: &[[VertexIndex; 4]],
        h1_order: usize,
    ) -> Result<Self, MeshTopologyError> {
        let mut topology = Self::empty(2, vertices);
        for quad in quads {
            topology.add_root_cell(CellTopology::Quadrilateral, quad, h1_order)?;
        }
        Ok(topology)
    }

    /// Creates a one-dimensional topology from line segments with increasing coordinates.
    pub fn from_lines(
        points: Vec<f64>,
        lines: &[[VertexIndex; 2]],
        h1_order: usize,
    ) -> Result<Self, MeshTopologyError> {
        let vertices = points.into_iter().map(|x| Point2::new(x, 0.0)).collect();
        let mut topology = Self::empty(1, vertices);
        for line in lines {
            topology.add_root_cell(CellTopology::Line, line, h1_order)?;
        }
        Ok(topology)
    }

    fn empty(space_dim: usize, points: Vec<Point2<f64>>) -> Self {
        let vertex_count = points.len();
        Self {
            space_dim,
            vertices: points
                .into_iter()
                .map(|point| Vertex {
                    point,
                    parent_edge: None,
                })
                .collect(),
            edges: Vec::new(),
            edge_lookup: FxHashMap::default(),
            cells: Vec::new(),
            edge_sides: Vec::new(),
            vertex_cells: vec![Vec::new(); vertex_count],
        }
    }

    fn add_root_cell(
        &mut self,
        topology: CellTopology,
        vertices: &[VertexIndex],
        h1_order: usize,
    ) -> Result<CellId, MeshTopologyError> {
        if h1_order == 0 {
            return Err(MeshTopologyError::InvalidOrder(h1_order));
        }
        let next_id = self.cells.len();
        if let Some(&v) = vertices.iter().find(|&&v| v >= self.vertices.len()) {
            return Err(MeshTopologyError::UnknownVertex(v));
        }
        debug_assert_eq!(vertices.len(), topology.vertex_count());
        Ok(self.push_cell(topology, vertices.to_vec(), None, 0, h1_order, next_id))
    }

    fn push_cell(
        &mut self,
        topology: CellTopology,
        vertices: Vec<VertexIndex>,
        parent: Option<(CellId, usize)>,
        level: usize,
        h1_order: usize,
        id: CellId,
    ) -> CellId {
        let sides: Vec<usize> = match topology {
            CellTopology::Line => vertices.clone(),
            CellTopology::Quadrilateral => (0..4)
                .map(|s| {
                    let [a, b] = [vertices[s], vertices[(s + 1) % 4]];
                    self.get_or_create_edge(a, b, None)
                })
                .collect(),
        };
        if topology == CellTopology::Quadrilateral {
            for (s, &e) in sides.iter().enumerate() {
                self.edge_sides[e].push((id, s));
            }
        }
        for &v in &vertices {
            self.vertex_cells[v].push(id);
        }
        let cell = Cell {
            id,
            topology,
            vertices,
            sides,
            parent: parent.map(|(p, _)| p),
            child_ordinal: parent.map(|(_, ordinal)| ordinal),
            children: Vec::new(),
            level,
            h1_order,
        };
        debug_assert_eq!(self.cells.len(), id);
        self.cells.push(Some(cell));
        id
    }

    fn get_or_create_edge(&mut self, a: VertexIndex, b: VertexIndex, parent: Option<EdgeParent>) -> EdgeIndex {
        let key = if a < b { [a, b] } else { [b, a] };
        if let Some(&e) = self.edge_lookup.get(&key) {
            return e;
        }
        let e = self.edges.len();
        self.edges.push(Edge {
            vertices: key,
            parent,
            children: Vec::new(),
            midpoint: None,
        });
        self.edge_sides.push(Vec::new());
        self.edge_lookup.insert(key, e);
        e
    }

    fn push_vertex(&mut self, point: Point2<f64>, parent_edge: Option<EdgeIndex>) -> VertexIndex {
        self.vertices.push(Vertex { point, parent_edge });
        self.vertex_cells.push(Vec::new());
        self.vertices.len() - 1
    }

    /// Splits an edge at its midpoint, unless it has been split before. Returns the midpoint.
    fn refine_edge(&mut self, e: EdgeIndex) -> VertexIndex {
        if let Some(m) = self.edges[e].midpoint {
            return m;
        }
        let [v0, v1] = self.edges[e].vertices;
        let point = Point2::from((self.vertices[v0].point.coords + self.vertices[v1].point.coords) * 0.5);
        let m = self.push_vertex(point, Some(e));
        // The midpoint always has the largest index, so it is the second vertex of both children
        let first = self.get_or_create_edge(
            v0,
            m,
            Some(EdgeParent {
                edge: e,
                interval: [-1.0, 0.0],
            }),
        );
        let second = self.get_or_create_edge(
            v1,
            m,
            Some(EdgeParent {
                edge: e,
                interval: [1.0, 0.0],
            }),
        );
        let edge = &mut self.edges[e];
        edge.midpoint = Some(m);
        edge.children = vec![first, second];
        m
    }

    pub fn space_dim(&self) -> usize {
        self.space_dim
    }

    pub fn cell(&self, id: CellId) -> Result<&Cell, MeshTopologyError> {
        self.cells
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(MeshTopologyError::UnknownCell(id))
    }

    pub fn active_cell(&self, id: CellId) -> Result<&Cell, MeshTopologyError> {
        let cell = self.cell(id)?;
        if cell.is_active() {
            Ok(cell)
        } else {
            Err(MeshTopologyError::InactiveCell(id))
        }
    }

    /// Ids of all cells in the tree, active or not, in increasing order.
    pub fn cell_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.iter().flatten().map(Cell::id)
    }

    /// Ids of the active (leaf) cells in increasing order.
    pub fn active_cells(&self) -> Vec<CellId> {
        self.cells
            .iter()
            .flatten()
            .filter(|cell| cell.is_active())
            .map(Cell::id)
            .collect()
    }

    pub fn vertex(&self, v: VertexIndex) -> &Vertex {
        &self.vertices[v]
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge(&self, e: EdgeIndex) -> &Edge {
        &self.edges[e]
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All cells (active or not) having the edge as a side, with the local side ordinal.
    pub fn edge_sides(&self, e: EdgeIndex) -> &[(CellId, usize)] {
        &self.edge_sides[e]
    }

    /// Active cells having the edge as a side, with the local side ordinal.
    pub fn active_edge_sides(&self, e: EdgeIndex) -> Vec<(CellId, usize)> {
        self.edge_sides[e]
            .iter()
            .filter(|(cell, _)| self.cell(*cell).map(Cell::is_active).unwrap_or(false))
            .copied()
            .collect()
    }

    /// All cells (active or not) having the vertex as a corner.
    pub fn vertex_cells(&self, v: VertexIndex) -> &[CellId] {
        &self.vertex_cells[v]
    }

    pub fn active_vertex_cells(&self, v: VertexIndex) -> Vec<CellId> {
        self.vertex_cells[v]
            .iter()
            .filter(|&&cell| self.cell(cell).map(Cell::is_active).unwrap_or(false))
            .copied()
            .collect()
    }

    /// The edge followed by its refinement ancestors, finest first.
    pub fn edge_ancestry(&self, e: EdgeIndex) -> Result<Vec<EdgeIndex>, MeshTopologyError> {
        let mut chain = vec![e];
        let mut current = e;
        while let Some(parent) = self.edges[current].parent {
            if chain.len() > MAX_TREE_DEPTH {
                return Err(MeshTopologyError::CyclicConstraint {
                    dimension: 1,
                    entity: e,
                });
            }
            current = parent.edge;
            chain.push(current);
        }
        Ok(chain)
    }

    /// Maps a parameter on `edge` to the corresponding parameter on one of its ancestors.
    ///
    /// Returns `None` if `ancestor` is not an ancestor of (or equal to) `edge`.
    pub fn edge_parameter_in_ancestor(&self, edge: EdgeIndex, t: f64, ancestor: EdgeIndex) -> Option<f64> {
        let mut current = edge;
        let mut t = t;
        for _ in 0..=MAX_TREE_DEPTH {
            if current == ancestor {
                return Some(t);
            }
            let parent = self.edges[current].parent?;
            t = parent.map_to_parent(t);
            current = parent.edge;
        }
        None
    }

    /// The parameter of a vertex on an edge it lies on: an endpoint, or a midpoint created by
    /// refining the edge or one of its descendants.
    pub fn vertex_parameter_on_edge(&self, v: VertexIndex, edge: EdgeIndex) -> Option<f64> {
        let [v0, v1] = self.edges[edge].vertices;
        if v == v0 {
            Some(-1.0)
        } else if v == v1 {
            Some(1.0)
        } else {
            let parent_edge = self.vertices[v].parent_edge?;
            self.edge_parameter_in_ancestor(parent_edge, 0.0, edge)
        }
    }

    /// Whether the side of a cell lies on the boundary of the domain.
    pub fn is_boundary_side(&self, cell: CellId, side: usize) -> Result<bool, MeshTopologyError> {
        let cell = self.cell(cell)?;
        let entity = cell.sides[side];
        match cell.topology {
            CellTopology::Line => Ok(self.active_vertex_cells(entity).len() == 1),
            CellTopology::Quadrilateral => {
                let root = self.edge_ancestry(entity)?.last().copied().unwrap_or(entity);
                Ok(self.edge_sides[root].len() == 1)
            }
        }
    }

    pub fn cell_geometry(&self, cell: CellId) -> Result<CellGeometry, MeshTopologyError> {
        let cell = self.cell(cell)?;
        let vertices = cell.vertices.iter().map(|&v| self.vertices[v].point).collect();
        CellGeometry::new(cell.topology, vertices)
    }

    pub(crate) fn set_h1_order(&mut self, cell: CellId, order: usize) -> Result<(), MeshTopologyError> {
        if order == 0 {
            return Err(MeshTopologyError::InvalidOrder(order));
        }
        self.active_cell(cell)?;
        if let Some(Some(cell)) = self.cells.get_mut(cell) {
            cell.h1_order = order;
        }
        Ok(())
    }

    /// Regular refinement of an active cell. Returns the ids of the new children.
    pub(crate) fn refine_cell(&mut self, id: CellId) -> Result<Vec<CellId>, MeshTopologyError> {
        let cell = self.active_cell(id)?.clone();
        let first_child = self.cells.len();
        let level = cell.level + 1;
        let order = cell.h1_order;
        let child_vertices: Vec<Vec<VertexIndex>> = match cell.topology {
            CellTopology::Line => {
                let [v0, v1] = [cell.vertices[0], cell.vertices[1]];
                let point = Point2::from((self.vertices[v0].point.coords + self.vertices[v1].point.coords) * 0.5);
                let m = self.push_vertex(point, None);
                vec![vec![v0, m], vec![m, v1]]
            }
            CellTopology::Quadrilateral => {
                let v = &cell.vertices;
                let midpoints: Vec<VertexIndex> = cell.sides.iter().map(|&e| self.refine_edge(e)).collect();
                let center = {
                    let sum = v
                        .iter()
                        .fold(nalgebra::Vector2::zeros(), |acc, &vi| acc + self.vertices[vi].point.coords);
                    self.push_vertex(Point2::from(sum * 0.25), None)
                };
                let [m01, m12, m23, m30] = [midpoints[0], midpoints[1], midpoints[2], midpoints[3]];
                vec![
                    vec![v[0], m01, center, m30],
                    vec![m01, v[1], m12, center],
                    vec![center, m12, v[2], m23],
                    vec![m30, center, m23, v[3]],
                ]
            }
        };
        let children: Vec<CellId> = child_vertices
            .into_iter()
            .enumerate()
            .map(|(ordinal, vertices)| {
                let child_id = first_child + ordinal;
                self.push_cell(cell.topology, vertices, Some((id, ordinal)), level, order, child_id)
            })
            .collect();
        if let Some(Some(parent)) = self.cells.get_mut(id) {
            parent.children = children.clone();
        }
        Ok(children)
    }

    /// Removes the children of a refined cell, making it active again.
    pub(crate) fn unrefine_cell(&mut self, id: CellId) -> Result<Vec<CellId>, MeshTopologyError> {
        let children = self.cell(id)?.children.clone();
        if children.is_empty() {
            return Err(MeshTopologyError::NotRefined(id));
        }
        for &child in &children {
            if !self.cell(child)?.is_active() {
                return Err(MeshTopologyError::RefinedChild { parent: id, child });
            }
        }
        for &child in &children {
            if let Some(cell) = self.cells[child].take() {
                if cell.topology == CellTopology::Quadrilateral {
                    for &e in &cell.sides {
                        self.edge_sides[e].retain(|&(c, _)| c != child);
                    }
                }
                for &v in &cell.vertices {
                    self.vertex_cells[v].retain(|&c| c != child);
                }
            }
        }
        if let Some(Some(parent)) = self.cells.get_mut(id) {
            parent.children.clear();
        }
        Ok(children)
    }
}
