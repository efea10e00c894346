//! Migration allowing at most one live friendship edge per unordered user pair.
//!
//! Declined edges are excluded so a declined request can be sent again.
//! Existing duplicate live edges are collapsed first, keeping the edge that
//! decides the relationship: an accepted edge, otherwise the newest pending
//! one by `(created_at, id)`.

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
                DELETE FROM friendship
                WHERE id IN (
                    SELECT id FROM (
                        SELECT id,
                               ROW_NUMBER() OVER (
                                   PARTITION BY LEAST(requester_id, addressee_id),
                                                GREATEST(requester_id, addressee_id)
                                   ORDER BY (status = 'accepted') DESC, created_at DESC, id DESC
                               ) AS rn
                        FROM friendship
                        WHERE status <> 'declined'
                    ) ranked
                    WHERE ranked.rn > 1
                );
                ",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_friendship_live_pair
                ON friendship (
                    LEAST(requester_id, addressee_id),
                    GREATEST(requester_id, addressee_id)
                )
                WHERE status <> 'declined';
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_friendship_live_pair;")
            .await?;

        Ok(())
    }
}
