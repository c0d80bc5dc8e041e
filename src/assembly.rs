//! Element assembly and global assembly through a [`DofInterpreter`](crate::dofs::DofInterpreter).
pub mod global;
pub mod local;
