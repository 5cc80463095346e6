use async_trait::async_trait;
use sqlx::FromRow;
use uuid::Uuid;

use super::{parse_opt_uuid, parse_uuid, SqliteGateStore};
use crate::domain::{normalize_plate, Amenity, Operator, Resident, TenantId, Worker};
use crate::infra::{DirectoryStore, GateError, Result};

#[derive(Debug, FromRow)]
struct AmenityRow {
    id: String,
    tenant_id: String,
    name: String,
    capacity: i64,
    operational: bool,
}

impl TryFrom<AmenityRow> for Amenity {
    type Error = GateError;

    fn try_from(row: AmenityRow) -> Result<Self> {
        Ok(Amenity {
            id: parse_uuid("amenity id", &row.id)?,
            tenant_id: TenantId::from_uuid(parse_uuid("tenant_id", &row.tenant_id)?),
            name: row.name,
            capacity: row.capacity as i32,
            operational: row.operational,
        })
    }
}

#[derive(Debug, FromRow)]
struct ResidentRow {
    id: String,
    tenant_id: String,
    name: String,
    unit: Option<String>,
}

#[derive(Debug, FromRow)]
struct WorkerRow {
    id: String,
    tenant_id: String,
    name: String,
    department: Option<String>,
}

#[derive(Debug, FromRow)]
struct OperatorRow {
    id: String,
    tenant_id: Option<String>,
    name: String,
}

impl SqliteGateStore {
    async fn resident_plates(&self, resident_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT plate FROM resident_vehicles WHERE resident_id = ? ORDER BY plate")
                .bind(resident_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[async_trait]
impl DirectoryStore for SqliteGateStore {
    async fn get_amenity(&self, id: Uuid) -> Result<Option<Amenity>> {
        let row = sqlx::query_as::<_, AmenityRow>(
            "SELECT id, tenant_id, name, capacity, operational FROM amenities WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Amenity::try_from).transpose()
    }

    async fn get_resident(&self, id: Uuid) -> Result<Option<Resident>> {
        let Some(row) = sqlx::query_as::<_, ResidentRow>(
            "SELECT id, tenant_id, name, unit FROM residents WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let vehicle_plates = self.resident_plates(&row.id).await?;
        Ok(Some(Resident {
            id: parse_uuid("resident id", &row.id)?,
            tenant_id: TenantId::from_uuid(parse_uuid("tenant_id", &row.tenant_id)?),
            name: row.name,
            unit: row.unit,
            vehicle_plates,
        }))
    }

    async fn get_worker(&self, id: Uuid) -> Result<Option<Worker>> {
        let row = sqlx::query_as::<_, WorkerRow>(
            "SELECT id, tenant_id, name, department FROM workers WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Worker {
                id: parse_uuid("worker id", &row.id)?,
                tenant_id: TenantId::from_uuid(parse_uuid("tenant_id", &row.tenant_id)?),
                name: row.name,
                department: row.department,
            })
        })
        .transpose()
    }

    async fn get_operator(&self, id: Uuid) -> Result<Option<Operator>> {
        let row = sqlx::query_as::<_, OperatorRow>(
            "SELECT id, tenant_id, name FROM operators WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Operator {
                id: parse_uuid("operator id", &row.id)?,
                tenant_id: parse_opt_uuid("tenant_id", row.tenant_id)?.map(TenantId::from_uuid),
                name: row.name,
            })
        })
        .transpose()
    }

    async fn operator_tenant(&self, operator_id: Uuid) -> Result<Option<TenantId>> {
        Ok(self
            .get_operator(operator_id)
            .await?
            .and_then(|operator| operator.tenant_id))
    }

    async fn find_resident_by_plate(
        &self,
        tenant_id: TenantId,
        plate: &str,
    ) -> Result<Option<Resident>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT resident_id FROM resident_vehicles WHERE tenant_id = ? AND plate = ?",
        )
        .bind(tenant_id.0.to_string())
        .bind(plate)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((resident_id,)) => {
                let resident = self
                    .get_resident(parse_uuid("resident_id", &resident_id)?)
                    .await?;
                // Guard against a roster row pointing into another tenant
                Ok(resident.filter(|r| r.tenant_id == tenant_id))
            }
            None => Ok(None),
        }
    }

    async fn upsert_amenity(&self, amenity: &Amenity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO amenities (id, tenant_id, name, capacity, operational)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                name = excluded.name,
                capacity = excluded.capacity,
                operational = excluded.operational
            "#,
        )
        .bind(amenity.id.to_string())
        .bind(amenity.tenant_id.0.to_string())
        .bind(&amenity.name)
        .bind(amenity.capacity as i64)
        .bind(amenity.operational)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_resident(&self, resident: &Resident) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let id = resident.id.to_string();
        let tenant = resident.tenant_id.0.to_string();

        sqlx::query(
            r#"
            INSERT INTO residents (id, tenant_id, name, unit)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                name = excluded.name,
                unit = excluded.unit
            "#,
        )
        .bind(&id)
        .bind(&tenant)
        .bind(&resident.name)
        .bind(&resident.unit)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM resident_vehicles WHERE resident_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for plate in resident.vehicle_plates.iter().filter_map(|p| normalize_plate(p)) {
            sqlx::query(
                "INSERT OR REPLACE INTO resident_vehicles (tenant_id, plate, resident_id) VALUES (?, ?, ?)",
            )
            .bind(&tenant)
            .bind(&plate)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_worker(&self, worker: &Worker) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workers (id, tenant_id, name, department)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                name = excluded.name,
                department = excluded.department
            "#,
        )
        .bind(worker.id.to_string())
        .bind(worker.tenant_id.0.to_string())
        .bind(&worker.name)
        .bind(&worker.department)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_operator(&self, operator: &Operator) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO operators (id, tenant_id, name)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                name = excluded.name
            "#,
        )
        .bind(operator.id.to_string())
        .bind(operator.tenant_id.map(|t| t.0.to_string()))
        .bind(&operator.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
