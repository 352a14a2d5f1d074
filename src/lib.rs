//! # Stencil
//!
//! Compiles a tree of `.cmp` component sources into a static site and into
//! server-side templates for Jinja, Handlebars and Mustache.
//!
//! ## Source Model
//!
//! 1. **Components** live under `src/components/`, views under `src/views/`
//!    and layouts under `src/layouts/`. Each file parses into a
//!    [`node::ComponentTree`].
//!
//! 2. **Markers** are the control tags (`If`, `ElseIf`, `Else`, `Loop`, `Var`,
//!    `Slot`, `Extends`, `Define`). They are validated at parse time, never
//!    at render time.
//!
//! 3. **Component references** are capitalized tags. Resolution either
//!    inlines the component body or emits a partial include, depending on
//!    the target dialect.
//!
//! ## Build
//!
//! [`Builder`] wires the shared services, optionally syncs the class
//! whitelist, then runs the stage pipeline:
//!
//! ```text
//! layout -> view -> css -> html -> asset
//!        \-> template
//! ```
//!
//! Every stage writes deterministic output: identical inputs produce
//! byte-identical trees.

pub mod builder;
pub mod component;
pub mod config;
pub mod css;
pub mod dialect;
pub mod discovery;
pub mod error;
pub mod events;
pub mod expr;
pub mod filters;
pub mod graph;
pub mod lint;
pub mod node;
pub mod parse;
pub mod pipeline;
pub mod render;
pub mod services;
pub mod stages;
pub mod transform;

#[cfg(test)]
mod component_tests;
#[cfg(test)]
mod pipeline_tests;

pub use builder::{BuildReport, Builder};
pub use dialect::Dialect;
pub use discovery::ComponentRegistry;
pub use error::{CompilerError, Error};
pub use parse::parse_component;
pub use render::Renderer;
pub use transform::{TemplateOutput, TransformOptions, Transformer};
