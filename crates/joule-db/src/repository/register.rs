//! # Register Repository
//!
//! Register catalogue entries (what a data point means and which unit it
//! carries). Owned remotely, reconciled here by `register_code`.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use joule_core::Register;

/// Repository for register reconciliation and lookup.
#[derive(Debug, Clone)]
pub struct RegisterRepository {
    pool: SqlitePool,
}

impl RegisterRepository {
    /// Creates a new RegisterRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RegisterRepository { pool }
    }

    /// Upserts a register by its natural key (`register_code`).
    ///
    /// Same contract as the meter upsert: unchanged data is a no-op and
    /// the return value reports whether anything was written.
    pub async fn upsert(&self, register: &Register) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO registers (
                id, register_code, name, data_point, unit,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (register_code) DO UPDATE SET
                name = excluded.name,
                data_point = excluded.data_point,
                unit = excluded.unit,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            WHERE name IS NOT excluded.name
               OR data_point IS NOT excluded.data_point
               OR unit IS NOT excluded.unit
               OR is_active IS NOT excluded.is_active
            "#,
        )
        .bind(&register.id)
        .bind(&register.register_code)
        .bind(&register.name)
        .bind(&register.data_point)
        .bind(&register.unit)
        .bind(register.is_active)
        .bind(register.created_at)
        .bind(register.updated_at)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if applied {
            debug!(register_code = %register.register_code, "Register definition applied");
        }
        Ok(applied)
    }

    /// Fetches a register by id.
    pub async fn get(&self, id: &str) -> DbResult<Register> {
        let register = sqlx::query_as::<_, Register>(
            r#"
            SELECT id, register_code, name, data_point, unit,
                   is_active, created_at, updated_at
            FROM registers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        register.ok_or_else(|| DbError::not_found("Register", id))
    }

    /// Looks a register up by its natural key.
    pub async fn get_by_code(&self, register_code: &str) -> DbResult<Option<Register>> {
        let register = sqlx::query_as::<_, Register>(
            r#"
            SELECT id, register_code, name, data_point, unit,
                   is_active, created_at, updated_at
            FROM registers
            WHERE register_code = ?1
            "#,
        )
        .bind(register_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(register)
    }

    /// Lists active registers ordered by code.
    pub async fn list_active(&self) -> DbResult<Vec<Register>> {
        let registers = sqlx::query_as::<_, Register>(
            r#"
            SELECT id, register_code, name, data_point, unit,
                   is_active, created_at, updated_at
            FROM registers
            WHERE is_active = 1
            ORDER BY register_code ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(registers)
    }

    /// Counts all registers.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM registers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use uuid::Uuid;

    fn register(code: &str, data_point: &str, unit: &str) -> Register {
        let now = Utc::now();
        Register {
            id: Uuid::new_v4().to_string(),
            register_code: code.to_string(),
            name: format!("Register {code}"),
            data_point: data_point.to_string(),
            unit: unit.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.registers();

        let r = register("1.8.0", "active_energy_import", "kWh");
        assert!(repo.upsert(&r).await.unwrap());

        let mut again = register("1.8.0", "active_energy_import", "kWh");
        again.created_at = r.created_at;
        again.updated_at = r.updated_at;
        assert!(!repo.upsert(&again).await.unwrap());

        let stored = repo.get_by_code("1.8.0").await.unwrap().unwrap();
        assert_eq!(stored.id, r.id);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_applies_unit_change() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.registers();

        repo.upsert(&register("3.8.0", "reactive_energy", "kvarh"))
            .await
            .unwrap();
        assert!(repo
            .upsert(&register("3.8.0", "reactive_energy", "Mvarh"))
            .await
            .unwrap());

        let stored = repo.get_by_code("3.8.0").await.unwrap().unwrap();
        assert_eq!(stored.unit, "Mvarh");
    }

    #[tokio::test]
    async fn test_get_missing_register_fails() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.registers();

        let err = repo.get("no-such-id").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
