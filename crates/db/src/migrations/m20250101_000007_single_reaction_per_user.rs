//! Migration restricting reactions to one emoji per user per post.
//!
//! Existing duplicates are collapsed first: one arbitrary row survives per
//! `(post_id, user_id)` group.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r"
                DELETE FROM reaction
                WHERE id IN (
                    SELECT id FROM (
                        SELECT id,
                               ROW_NUMBER() OVER (PARTITION BY post_id, user_id ORDER BY id) AS rn
                        FROM reaction
                    ) ranked
                    WHERE ranked.rn > 1
                );
                ",
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_reaction_post_user_emoji")
                    .table(Reaction::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reaction_post_user")
                    .table(Reaction::Table)
                    .col(Reaction::PostId)
                    .col(Reaction::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_reaction_post_user")
                    .table(Reaction::Table)
                    .to_owned(),
            )
            .await?;

        // Deleted duplicates are not restored
        manager
            .create_index(
                Index::create()
                    .name("idx_reaction_post_user_emoji")
                    .table(Reaction::Table)
                    .col(Reaction::PostId)
                    .col(Reaction::UserId)
                    .col(Reaction::Emoji)
                    .unique()
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum Reaction {
    Table,
    PostId,
    UserId,
    Emoji,
}
