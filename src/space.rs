//! Variables, function spaces and the local DOF layout of a cell.
//!
//! The function space of a variable is a tagged variant resolved once, when the variable is
//! created. Everything that depends on it (basis order, node placement, which subcells carry
//! DOFs) is computed from the tag, without any run-time dispatch.
use crate::element::{CellTopology, LagrangeBasis};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

pub type VarId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionSpace {
    /// Continuous nodal basis of the cell's H1 order.
    HGrad,
    /// Discontinuous nodal basis of one order less than the cell's H1 order.
    L2,
    /// Continuous basis on the cell sides (the mesh skeleton), of the cell's H1 order.
    Trace,
}

impl FunctionSpace {
    /// Polynomial order of the basis on a cell of the given H1 order.
    pub fn basis_order(self, h1_order: usize) -> usize {
        match self {
            Self::HGrad | Self::Trace => h1_order,
            Self::L2 => h1_order.saturating_sub(1),
        }
    }

    pub fn is_trace(self) -> bool {
        matches!(self, Self::Trace)
    }

    /// Whether the space has DOFs on vertices and edges shared between cells.
    pub fn is_continuous(self) -> bool {
        !matches!(self, Self::L2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    id: VarId,
    name: String,
    space: FunctionSpace,
}

impl Variable {
    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> FunctionSpace {
        self.space
    }
}

/// Hands out variables with sequential ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarFactory {
    variables: Vec<Variable>,
}

impl VarFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_var(&mut self, name: impl Into<String>, space: FunctionSpace) -> Variable {
        let variable = Variable {
            id: self.variables.len(),
            name: name.into(),
            space,
        };
        self.variables.push(variable.clone());
        variable
    }

    pub fn trace_var(&mut self, name: impl Into<String>) -> Variable {
        self.field_var(name, FunctionSpace::Trace)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id)
    }
}

/// A subcell of a reference cell, identified by its dimension and its ordinal among the subcells
/// of that dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subcell {
    pub dimension: usize,
    pub ordinal: usize,
}

/// A basis function of a cell, identified by its interpolation node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasisNode {
    /// The subcell whose closure the node lies in the interior of.
    pub subcell: Subcell,
    /// Reference coordinates of the node.
    pub reference_point: Point2<f64>,
}

/// The basis functions of one variable on a cell, or of one side of a trace variable.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisBlock {
    var: VarId,
    space: FunctionSpace,
    side: Option<usize>,
    offset: usize,
    basis: LagrangeBasis,
    nodes: Vec<BasisNode>,
}

impl BasisBlock {
    pub fn var(&self) -> VarId {
        self.var
    }

    pub fn space(&self) -> FunctionSpace {
        self.space
    }

    /// The side of a trace block; `None` for field variables.
    pub fn side(&self) -> Option<usize> {
        self.side
    }

    /// Position of the first basis function of the block in the cell's local DOF vector.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The basis of the block. For trace blocks this is the one-dimensional basis along the side.
    pub fn basis(&self) -> &LagrangeBasis {
        &self.basis
    }

    pub fn nodes(&self) -> &[BasisNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Local DOF indices of the block.
    pub fn local_indices(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.nodes.len()
    }
}

/// Local DOF layout of a cell of a given topology and H1 order: variables in id order, trace
/// variables split into one block per side.
#[derive(Debug, Clone, PartialEq)]
pub struct DofOrdering {
    topology: CellTopology,
    h1_order: usize,
    blocks: Vec<BasisBlock>,
    local_dof_count: usize,
}

impl DofOrdering {
    pub fn new(topology: CellTopology, h1_order: usize, variables: &[Variable]) -> Self {
        let mut blocks = Vec::new();
        let mut offset = 0;
        for variable in variables {
            let order = variable.space.basis_order(h1_order);
            match variable.space {
                FunctionSpace::HGrad | FunctionSpace::L2 => {
                    let basis = LagrangeBasis::new(topology, order);
                    let nodes = field_nodes(topology, &basis, variable.space);
                    let block = BasisBlock {
                        var: variable.id,
                        space: variable.space,
                        side: None,
                        offset,
                        basis,
                        nodes,
                    };
                    offset += block.len();
                    blocks.push(block);
                }
                FunctionSpace::Trace => {
                    for side in 0..topology.side_count() {
                        let (basis, nodes) = trace_nodes(topology, side, order);
                        let block = BasisBlock {
                            var: variable.id,
                            space: variable.space,
                            side: Some(side),
                            offset,
                            basis,
                            nodes,
                        };
                        offset += block.len();
                        blocks.push(block);
                    }
                }
            }
        }
        Self {
            topology,
            h1_order,
            blocks,
            local_dof_count: offset,
        }
    }

    pub fn topology(&self) -> CellTopology {
        self.topology
    }

    pub fn h1_order(&self) -> usize {
        self.h1_order
    }

    pub fn local_dof_count(&self) -> usize {
        self.local_dof_count
    }

    pub fn blocks(&self) -> &[BasisBlock] {
        &self.blocks
    }

    pub fn blocks_for_var(&self, var: VarId) -> impl Iterator<Item = &BasisBlock> {
        self.blocks.iter().filter(move |block| block.var == var)
    }

    pub fn block(&self, var: VarId, side: Option<usize>) -> Option<&BasisBlock> {
        self.blocks
            .iter()
            .find(|block| block.var == var && block.side == side)
    }
}

/// Classifies the nodes of a field basis by the subcell they belong to.
fn field_nodes(topology: CellTopology, basis: &LagrangeBasis, space: FunctionSpace) -> Vec<BasisNode> {
    let interior = Subcell {
        dimension: topology.dimension(),
        ordinal: 0,
    };
    let order = basis.order();
    (0..basis.cardinality())
        .map(|n| {
            let reference_point = basis.node_point(n);
            let subcell = if space == FunctionSpace::L2 {
                interior
            } else {
                let (i, j) = basis.tensor_indices(n);
                classify_tensor_node(topology, order, i, j)
            };
            BasisNode {
                subcell,
                reference_point,
            }
        })
        .collect()
}

fn classify_tensor_node(topology: CellTopology, order: usize, i: usize, j: usize) -> Subcell {
    let vertex = |ordinal| Subcell { dimension: 0, ordinal };
    let edge = |ordinal| Subcell { dimension: 1, ordinal };
    match topology {
        CellTopology::Line => match i {
            0 => vertex(0),
            i if i == order => vertex(1),
            _ => edge(0),
        },
        CellTopology::Quadrilateral => {
            let (i_min, i_max, j_min, j_max) = (i == 0, i == order, j == 0, j == order);
            match (i_min, i_max, j_min, j_max) {
                (true, _, true, _) => vertex(0),
                (_, true, true, _) => vertex(1),
                (_, true, _, true) => vertex(2),
                (true, _, _, true) => vertex(3),
                (_, _, true, _) => edge(0),
                (_, true, _, _) => edge(1),
                (_, _, _, true) => edge(2),
                (true, _, _, _) => edge(3),
                _ => Subcell {
                    dimension: 2,
                    ordinal: 0,
                },
            }
        }
    }
}

/// Basis and nodes of one side of a trace variable.
fn trace_nodes(topology: CellTopology, side: usize, order: usize) -> (LagrangeBasis, Vec<BasisNode>) {
    match topology {
        CellTopology::Line => {
            let basis = LagrangeBasis::new(CellTopology::Line, 0);
            let node = BasisNode {
                subcell: Subcell {
                    dimension: 0,
                    ordinal: side,
                },
                reference_point: topology.reference_vertex(side),
            };
            (basis, vec![node])
        }
        CellTopology::Quadrilateral => {
            let basis = LagrangeBasis::new(CellTopology::Line, order);
            let [a, b] = [topology.side_vertices(side)[0], topology.side_vertices(side)[1]];
            let nodes = basis
                .nodes_1d()
                .iter()
                .enumerate()
                .map(|(k, &t)| {
                    let subcell = if k == 0 {
                        Subcell { dimension: 0, ordinal: a }
                    } else if k == order {
                        Subcell { dimension: 0, ordinal: b }
                    } else {
                        Subcell {
                            dimension: 1,
                            ordinal: side,
                        }
                    };
                    BasisNode {
                        subcell,
                        reference_point: topology.side_point(side, t),
                    }
                })
                .collect();
            (basis, nodes)
        }
    }
}
