//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250101_000001_create_user_table;
mod m20250101_000002_create_post_table;
mod m20250101_000003_create_friendship_table;
mod m20250101_000004_create_reaction_table;
mod m20250101_000005_create_comment_table;
mod m20250101_000006_add_comment_parent_id;
mod m20250101_000007_single_reaction_per_user;
mod m20250101_000008_add_friendship_pair_index;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_user_table::Migration),
            Box::new(m20250101_000002_create_post_table::Migration),
            Box::new(m20250101_000003_create_friendship_table::Migration),
            Box::new(m20250101_000004_create_reaction_table::Migration),
            Box::new(m20250101_000005_create_comment_table::Migration),
            Box::new(m20250101_000006_add_comment_parent_id::Migration),
            Box::new(m20250101_000007_single_reaction_per_user::Migration),
            Box::new(m20250101_000008_add_friendship_pair_index::Migration),
        ]
    }
}
