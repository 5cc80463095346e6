use async_trait::async_trait;
use sqlx::FromRow;
use uuid::Uuid;

use super::PgGateStore;
use crate::domain::{normalize_plate, Amenity, Operator, Resident, TenantId, Worker};
use crate::infra::{DirectoryStore, Result};

#[derive(Debug, FromRow)]
struct AmenityRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    capacity: i32,
    operational: bool,
}

impl From<AmenityRow> for Amenity {
    fn from(row: AmenityRow) -> Self {
        Amenity {
            id: row.id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            capacity: row.capacity,
            operational: row.operational,
        }
    }
}

#[derive(Debug, FromRow)]
struct ResidentRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    unit: Option<String>,
    plates: Vec<String>,
}

impl From<ResidentRow> for Resident {
    fn from(row: ResidentRow) -> Self {
        Resident {
            id: row.id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            unit: row.unit,
            vehicle_plates: row.plates,
        }
    }
}

const RESIDENT_SELECT: &str = r#"
    SELECT r.id, r.tenant_id, r.name, r.unit,
           COALESCE(
               (SELECT array_agg(v.plate ORDER BY v.plate)
                FROM resident_vehicles v WHERE v.resident_id = r.id),
               ARRAY[]::TEXT[]
           ) AS plates
    FROM residents r
"#;

#[async_trait]
impl DirectoryStore for PgGateStore {
    async fn get_amenity(&self, id: Uuid) -> Result<Option<Amenity>> {
        let row = sqlx::query_as::<_, AmenityRow>(
            "SELECT id, tenant_id, name, capacity, operational FROM amenities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Amenity::from))
    }

    async fn get_resident(&self, id: Uuid) -> Result<Option<Resident>> {
        let sql = format!("{RESIDENT_SELECT} WHERE r.id = $1");
        let row = sqlx::query_as::<_, ResidentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Resident::from))
    }

    async fn get_worker(&self, id: Uuid) -> Result<Option<Worker>> {
        let row: Option<(Uuid, Uuid, String, Option<String>)> = sqlx::query_as(
            "SELECT id, tenant_id, name, department FROM workers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, tenant_id, name, department)| Worker {
            id,
            tenant_id: TenantId::from_uuid(tenant_id),
            name,
            department,
        }))
    }

    async fn get_operator(&self, id: Uuid) -> Result<Option<Operator>> {
        let row: Option<(Uuid, Option<Uuid>, String)> =
            sqlx::query_as("SELECT id, tenant_id, name FROM operators WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, tenant_id, name)| Operator {
            id,
            tenant_id: tenant_id.map(TenantId::from_uuid),
            name,
        }))
    }

    async fn operator_tenant(&self, operator_id: Uuid) -> Result<Option<TenantId>> {
        let row: Option<(Option<Uuid>,)> =
            sqlx::query_as("SELECT tenant_id FROM operators WHERE id = $1")
                .bind(operator_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|r| r.0).map(TenantId::from_uuid))
    }

    async fn find_resident_by_plate(
        &self,
        tenant_id: TenantId,
        plate: &str,
    ) -> Result<Option<Resident>> {
        let sql = format!(
            "{RESIDENT_SELECT} \
             JOIN resident_vehicles rv ON rv.resident_id = r.id \
             WHERE rv.tenant_id = $1 AND rv.plate = $2 AND r.tenant_id = $1"
        );
        let row = sqlx::query_as::<_, ResidentRow>(&sql)
            .bind(tenant_id.0)
            .bind(plate)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Resident::from))
    }

    async fn upsert_amenity(&self, amenity: &Amenity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO amenities (id, tenant_id, name, capacity, operational)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                name = EXCLUDED.name,
                capacity = EXCLUDED.capacity,
                operational = EXCLUDED.operational
            "#,
        )
        .bind(amenity.id)
        .bind(amenity.tenant_id.0)
        .bind(&amenity.name)
        .bind(amenity.capacity)
        .bind(amenity.operational)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_resident(&self, resident: &Resident) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO residents (id, tenant_id, name, unit)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                name = EXCLUDED.name,
                unit = EXCLUDED.unit
            "#,
        )
        .bind(resident.id)
        .bind(resident.tenant_id.0)
        .bind(&resident.name)
        .bind(&resident.unit)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM resident_vehicles WHERE resident_id = $1")
            .bind(resident.id)
            .execute(&mut *tx)
            .await?;

        for plate in resident.vehicle_plates.iter().filter_map(|p| normalize_plate(p)) {
            sqlx::query(
                r#"
                INSERT INTO resident_vehicles (tenant_id, plate, resident_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (tenant_id, plate) DO UPDATE SET resident_id = EXCLUDED.resident_id
                "#,
            )
            .bind(resident.tenant_id.0)
            .bind(&plate)
            .bind(resident.id)
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
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                name = EXCLUDED.name,
                department = EXCLUDED.department
            "#,
        )
        .bind(worker.id)
        .bind(worker.tenant_id.0)
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
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                name = EXCLUDED.name
            "#,
        )
        .bind(operator.id)
        .bind(operator.tenant_id.map(|t| t.0))
        .bind(&operator.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
