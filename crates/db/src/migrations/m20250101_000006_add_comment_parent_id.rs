//! Migration to add `parent_id` to the comment table for one level of replies.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Comment::Table)
                    .add_column(ColumnDef::new(Comment::ParentId).string_len(32).null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comment_parent_id")
                    .table(Comment::Table)
                    .col(Comment::ParentId)
                    .to_owned(),
            )
            .await?;

        // Replies go away with their parent
        manager
            .create_foreign_key(
                ForeignKey::create()
                    .name("fk_comment_parent")
                    .from(Comment::Table, Comment::ParentId)
                    .to(Comment::Table, Comment::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_foreign_key(
                ForeignKey::drop()
                    .name("fk_comment_parent")
                    .table(Comment::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_comment_parent_id").to_owned())
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Comment::Table)
                    .drop_column(Comment::ParentId)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum Comment {
    Table,
    Id,
    ParentId,
}
