//! `studio-driver` is the driver layer of a multi-backend SQL client.
//!
//! It presents MySQL-family and SQLite-family backends through one canonical
//! model:
//! - [`Driver::schemas`] / [`Driver::table_schema`] introspect the catalog
//!   into a [`SchemaCollection`]
//! - [`Driver::query`] / [`Driver::transaction`] return [`QueryResultSet`]s
//! - [`Driver::create_update_table_schema`] turns a [`ddl::TableChange`]
//!   into ordered DDL statements
//!
//! Backends are reached through the [`Connection`] trait; [`PipelineClient`]
//! implements it for remote libSQL stores over the `/v2/pipeline` HTTP API.

mod client;
mod connection;
mod decode;
mod driver;
mod error;
mod flags;
mod mysql;
mod options;
mod params;
mod schema;
mod sqlite;
mod typemap;
mod types;
mod value;
mod wire;

pub mod ddl;
pub mod introspect;
pub mod transform;

pub use client::{to_pipeline_url, PipelineClient};
pub use connection::Connection;
pub use driver::Driver;
pub use error::DriverError;
pub use flags::{Dialect, DriverFlags};
pub use mysql::MySqlDriver;
pub use options::ClientOptions;
pub use params::{Params, Statement};
pub use schema::{
    Column, ColumnConstraint, Constraint, ConstraintKind, ForeignKey, Schema, SchemaCollection,
    SchemaItem, Table, TableStats, Trigger,
};
pub use sqlite::SqliteDriver;
pub use transform::{transform, IntMode, TransformOptions};
pub use typemap::{canonical_type, render_default, ColumnType};
pub use types::{Header, QueryResultSet, QueryStats, RawResult, RawStats, Row};
pub use value::Value;

pub type Result<T> = std::result::Result<T, DriverError>;
