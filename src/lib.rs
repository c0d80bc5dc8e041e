//! Minimum-rule global degree-of-freedom numbering for hp-adaptive, nonconforming meshes,
//! and a geometric multigrid preconditioner built on top of it.
//!
//! The central type is [`dofs::GlobalDofAssignment`], which resolves, for every active cell of a
//! [`mesh::Mesh`], which neighbor's basis constrains each shared entity, numbers the owned
//! entities contiguously per partition and provides local-to-global interpretation of element
//! data. [`multigrid::GmgOperator`] combines two or more such numberings on nested meshes into a
//! preconditioner for [`multigrid::GmgSolver`].

pub mod assembly;
pub mod dofs;
pub mod element;
pub mod error;
pub mod mesh;
pub mod multigrid;
pub mod quadrature;
pub mod solution;
pub mod space;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Identifier of a cell in a mesh. Cell ids are stable under refinement.
pub type CellId = usize;
