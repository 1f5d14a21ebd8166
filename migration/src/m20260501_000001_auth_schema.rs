use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create auth_group table: rule grants per group
        manager
            .create_table(
                Table::create()
                    .table(AuthGroup::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthGroup::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(AuthGroup::Title))
                    .col(
                        ColumnDef::new(AuthGroup::Status)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    // Comma-separated list of rule ids granted to the group
                    .col(string(AuthGroup::Rules))
                    .to_owned(),
            )
            .await?;

        // Create auth_group_access table: subject <-> group membership
        manager
            .create_table(
                Table::create()
                    .table(AuthGroupAccess::Table)
                    .if_not_exists()
                    .col(string(AuthGroupAccess::SubjectId))
                    .col(big_integer(AuthGroupAccess::GroupId))
                    .primary_key(
                        Index::create()
                            .col(AuthGroupAccess::SubjectId)
                            .col(AuthGroupAccess::GroupId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_auth_group_access_subject")
                    .table(AuthGroupAccess::Table)
                    .col(AuthGroupAccess::SubjectId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Create auth_rule table: named permissions, optionally conditioned
        manager
            .create_table(
                Table::create()
                    .table(AuthRule::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthRule::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(AuthRule::Name))
                    .col(
                        ColumnDef::new(AuthRule::Type)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(AuthRule::Status)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(string_null(AuthRule::Condition))
                    .to_owned(),
            )
            .await?;

        // Create member table: the default subject/attribute table
        manager
            .create_table(
                Table::create()
                    .table(Member::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Member::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(Member::Username))
                    .col(big_integer_null(Member::Score))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Member::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthRule::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthGroupAccess::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthGroup::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum AuthGroup {
    Table,
    Id,
    Title,
    Status,
    Rules,
}

#[derive(DeriveIden)]
enum AuthGroupAccess {
    Table,
    SubjectId,
    GroupId,
}

#[derive(DeriveIden)]
enum AuthRule {
    Table,
    Id,
    Name,
    Type,
    Status,
    Condition,
}

#[derive(DeriveIden)]
enum Member {
    Table,
    Id,
    Username,
    Score,
}
