pub use sea_orm_migration::prelude::*;

mod m001_monitoring_schema;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m001_monitoring_schema::Migration)]
    }
}
