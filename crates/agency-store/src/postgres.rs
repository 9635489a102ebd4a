//! # PostgreSQL Engine
//!
//! One `sqlx::Transaction` per unit of work at the server default
//! isolation (read committed). Every single-row read locks the row with
//! `FOR UPDATE`, so check-then-write sequences (balance debits, payment
//! settlement) serialize against concurrent units of work touching the
//! same row.
//!
//! Enums and plates are stored as `TEXT`; rates and amounts as `NUMERIC`.
//! Queries use the runtime-checked `sqlx::query` API so the crate builds
//! without a live database.

use agency_core::{
    Agency, AgencyId, Branch, BranchId, Customer, CustomerId, Package, PackageId, Payment,
    PaymentId, PaymentMethod, PaymentStatus, Plate, Rate, Sale, SaleId, Vehicle, VehicleId,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgQueryResult};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::StoreError;
use crate::ports::{SettlementStore, UnitOfWork};

/// PostgreSQL-backed engine.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool. Migrations are not run.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, then apply embedded migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;

        tracing::info!("Connected to PostgreSQL");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }

    /// Connect using `DATABASE_URL`.
    ///
    /// Returns `Ok(None)` when the variable is unset (in-memory mode).
    pub async fn from_env() -> Result<Option<Self>, StoreError> {
        match std::env::var("DATABASE_URL") {
            Ok(url) => Self::connect(&url).await.map(Some),
            Err(_) => {
                tracing::warn!(
                    "DATABASE_URL not set, running in-memory only mode. \
                     State will not survive restarts."
                );
                Ok(None)
            }
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SettlementStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Begin(e.to_string()))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    fn engine(&self) -> &'static str {
        "postgres"
    }
}

/// Unit of work wrapping one open database transaction.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

/// Map unique-key violations to [`StoreError::Duplicate`].
fn classify_insert(err: sqlx::Error, kind: &'static str, key: impl std::fmt::Display) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Duplicate {
                kind,
                key: key.to_string(),
            };
        }
    }
    StoreError::Database(err)
}

fn expect_one(
    result: PgQueryResult,
    kind: &'static str,
    id: impl std::fmt::Display,
) -> Result<(), StoreError> {
    if result.rows_affected() == 0 {
        return Err(StoreError::missing(kind, id));
    }
    Ok(())
}

fn decode_rate(kind: &'static str, value: Decimal) -> Result<Rate, StoreError> {
    Rate::new(value).map_err(|e| StoreError::corrupt(kind, e.to_string()))
}

// -- row types ----------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct AgencyRow {
    id: Uuid,
    name: String,
    commission_rate: Decimal,
    balance: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AgencyRow {
    fn into_record(self) -> Result<Agency, StoreError> {
        Ok(Agency {
            id: AgencyId(self.id),
            name: self.name,
            commission_rate: decode_rate("agency", self.commission_rate)?,
            balance: self.balance,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BranchRow {
    id: Uuid,
    agency_id: Uuid,
    name: String,
    commission_rate: Decimal,
    balance: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BranchRow {
    fn into_record(self) -> Result<Branch, StoreError> {
        Ok(Branch {
            id: BranchId(self.id),
            agency_id: AgencyId(self.agency_id),
            name: self.name,
            commission_rate: decode_rate("branch", self.commission_rate)?,
            balance: self.balance,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    agency_id: Option<Uuid>,
    full_name: String,
    national_id: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CustomerRow {
    fn into_record(self) -> Customer {
        Customer {
            id: CustomerId(self.id),
            agency_id: self.agency_id.map(AgencyId),
            full_name: self.full_name,
            national_id: self.national_id,
            email: self.email,
            phone: self.phone,
            address: self.address,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: Uuid,
    plate: String,
    customer_id: Uuid,
    agency_id: Option<Uuid>,
    brand: Option<String>,
    model: Option<String>,
    model_year: Option<i32>,
    chassis_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VehicleRow {
    fn into_record(self) -> Result<Vehicle, StoreError> {
        let plate = Plate::parse(&self.plate).map_err(|e| StoreError::corrupt("vehicle", e.to_string()))?;
        Ok(Vehicle {
            id: VehicleId(self.id),
            plate,
            customer_id: CustomerId(self.customer_id),
            agency_id: self.agency_id.map(AgencyId),
            brand: self.brand,
            model: self.model,
            model_year: self.model_year,
            chassis_number: self.chassis_number,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PackageRow {
    id: Uuid,
    name: String,
    price: Decimal,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SaleRow {
    id: Uuid,
    customer_id: Uuid,
    vehicle_id: Uuid,
    agency_id: Option<Uuid>,
    branch_id: Option<Uuid>,
    package_id: Uuid,
    price: Decimal,
    commission: Decimal,
    branch_commission: Option<Decimal>,
    agency_commission: Option<Decimal>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    policy_number: String,
    is_refunded: bool,
    refunded_at: Option<DateTime<Utc>>,
    refund_amount: Option<Decimal>,
    refund_reason: Option<String>,
    refunded_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl SaleRow {
    fn into_record(self) -> Sale {
        Sale {
            id: SaleId(self.id),
            customer_id: CustomerId(self.customer_id),
            vehicle_id: VehicleId(self.vehicle_id),
            agency_id: self.agency_id.map(AgencyId),
            branch_id: self.branch_id.map(BranchId),
            package_id: PackageId(self.package_id),
            price: self.price,
            commission: self.commission,
            branch_commission: self.branch_commission,
            agency_commission: self.agency_commission,
            start_date: self.start_date,
            end_date: self.end_date,
            policy_number: self.policy_number,
            is_refunded: self.is_refunded,
            refunded_at: self.refunded_at,
            refund_amount: self.refund_amount,
            refund_reason: self.refund_reason,
            refunded_by: self.refunded_by,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    sale_id: Uuid,
    agency_id: Option<Uuid>,
    amount: Decimal,
    method: String,
    status: String,
    transaction_id: Option<String>,
    failure_reason: Option<String>,
    provider_detail: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_record(self) -> Result<Payment, StoreError> {
        let method = PaymentMethod::parse(&self.method)
            .ok_or_else(|| StoreError::corrupt("payment", format!("unknown method {}", self.method)))?;
        let status = PaymentStatus::parse(&self.status)
            .ok_or_else(|| StoreError::corrupt("payment", format!("unknown status {}", self.status)))?;
        Ok(Payment {
            id: PaymentId(self.id),
            sale_id: SaleId(self.sale_id),
            agency_id: self.agency_id.map(AgencyId),
            amount: self.amount,
            method,
            status,
            transaction_id: self.transaction_id,
            failure_reason: self.failure_reason,
            provider_detail: self.provider_detail,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const AGENCY_COLUMNS: &str = "id, name, commission_rate, balance, created_at, updated_at";
const BRANCH_COLUMNS: &str = "id, agency_id, name, commission_rate, balance, created_at, updated_at";
const CUSTOMER_COLUMNS: &str =
    "id, agency_id, full_name, national_id, email, phone, address, created_at, updated_at";
const VEHICLE_COLUMNS: &str = "id, plate, customer_id, agency_id, brand, model, model_year, \
     chassis_number, created_at, updated_at";
const SALE_COLUMNS: &str = "id, customer_id, vehicle_id, agency_id, branch_id, package_id, price, \
     commission, branch_commission, agency_commission, start_date, end_date, policy_number, \
     is_refunded, refunded_at, refund_amount, refund_reason, refunded_by, created_at";
const PAYMENT_COLUMNS: &str = "id, sale_id, agency_id, amount, method, status, transaction_id, \
     failure_reason, provider_detail, created_at, updated_at";

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(CustomerRow::into_record))
    }

    async fn insert_customer(&mut self, c: &Customer) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO customers (id, agency_id, full_name, national_id, email, phone, address, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(c.id.0)
        .bind(c.agency_id.map(|a| a.0))
        .bind(&c.full_name)
        .bind(&c.national_id)
        .bind(&c.email)
        .bind(&c.phone)
        .bind(&c.address)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify_insert(e, "customer", c.id))?;
        Ok(())
    }

    async fn update_customer(&mut self, c: &Customer) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE customers SET agency_id = $2, full_name = $3, national_id = $4, email = $5,
                    phone = $6, address = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(c.id.0)
        .bind(c.agency_id.map(|a| a.0))
        .bind(&c.full_name)
        .bind(&c.national_id)
        .bind(&c.email)
        .bind(&c.phone)
        .bind(&c.address)
        .bind(c.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result, "customer", c.id)
    }

    async fn vehicle(&mut self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, VehicleRow>(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(VehicleRow::into_record)
            .transpose()
    }

    async fn vehicle_by_plate(&mut self, plate: &Plate) -> Result<Option<Vehicle>, StoreError> {
        let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE plate = $1 FOR UPDATE");
        sqlx::query_as::<_, VehicleRow>(&sql)
            .bind(plate.as_str())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(VehicleRow::into_record)
            .transpose()
    }

    async fn insert_vehicle(&mut self, v: &Vehicle) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO vehicles (id, plate, customer_id, agency_id, brand, model, model_year, chassis_number, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(v.id.0)
        .bind(v.plate.as_str())
        .bind(v.customer_id.0)
        .bind(v.agency_id.map(|a| a.0))
        .bind(&v.brand)
        .bind(&v.model)
        .bind(v.model_year)
        .bind(&v.chassis_number)
        .bind(v.created_at)
        .bind(v.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify_insert(e, "vehicle plate", &v.plate))?;
        Ok(())
    }

    async fn update_vehicle(&mut self, v: &Vehicle) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE vehicles SET customer_id = $2, agency_id = $3, brand = $4, model = $5,
                    model_year = $6, chassis_number = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(v.id.0)
        .bind(v.customer_id.0)
        .bind(v.agency_id.map(|a| a.0))
        .bind(&v.brand)
        .bind(&v.model)
        .bind(v.model_year)
        .bind(&v.chassis_number)
        .bind(v.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result, "vehicle", v.id)
    }

    async fn package(&mut self, id: PackageId) -> Result<Option<Package>, StoreError> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT id, name, price, created_at FROM packages WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(|r| Package {
            id: PackageId(r.id),
            name: r.name,
            price: r.price,
            created_at: r.created_at,
        }))
    }

    async fn insert_package(&mut self, p: &Package) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO packages (id, name, price, created_at) VALUES ($1, $2, $3, $4)")
            .bind(p.id.0)
            .bind(&p.name)
            .bind(p.price)
            .bind(p.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify_insert(e, "package", p.id))?;
        Ok(())
    }

    async fn agency(&mut self, id: AgencyId) -> Result<Option<Agency>, StoreError> {
        let sql = format!("SELECT {AGENCY_COLUMNS} FROM agencies WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, AgencyRow>(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(AgencyRow::into_record)
            .transpose()
    }

    async fn insert_agency(&mut self, a: &Agency) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agencies (id, name, commission_rate, balance, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(a.id.0)
        .bind(&a.name)
        .bind(a.commission_rate.percent())
        .bind(a.balance)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify_insert(e, "agency", a.id))?;
        Ok(())
    }

    async fn update_agency(&mut self, a: &Agency) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE agencies SET name = $2, commission_rate = $3, balance = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(a.id.0)
        .bind(&a.name)
        .bind(a.commission_rate.percent())
        .bind(a.balance)
        .bind(a.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result, "agency", a.id)
    }

    async fn branch(&mut self, id: BranchId) -> Result<Option<Branch>, StoreError> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, BranchRow>(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(BranchRow::into_record)
            .transpose()
    }

    async fn insert_branch(&mut self, b: &Branch) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO branches (id, agency_id, name, commission_rate, balance, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(b.id.0)
        .bind(b.agency_id.0)
        .bind(&b.name)
        .bind(b.commission_rate.percent())
        .bind(b.balance)
        .bind(b.created_at)
        .bind(b.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify_insert(e, "branch", b.id))?;
        Ok(())
    }

    async fn update_branch(&mut self, b: &Branch) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE branches SET name = $2, commission_rate = $3, balance = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(b.id.0)
        .bind(&b.name)
        .bind(b.commission_rate.percent())
        .bind(b.balance)
        .bind(b.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result, "branch", b.id)
    }

    async fn max_branch_rate(&mut self, agency_id: AgencyId) -> Result<Option<Rate>, StoreError> {
        // Lock the branch rows so a concurrent branch update cannot slip
        // past an agency rate decrease.
        let rates: Vec<Decimal> = sqlx::query_scalar(
            "SELECT commission_rate FROM branches WHERE agency_id = $1 FOR UPDATE",
        )
        .bind(agency_id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rates
            .into_iter()
            .map(|r| decode_rate("branch", r))
            .try_fold(None, |max: Option<Rate>, rate| {
                rate.map(|r| Some(max.map_or(r, |m| m.max(r))))
            })
    }

    async fn sale(&mut self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(SaleRow::into_record))
    }

    async fn insert_sale(&mut self, s: &Sale) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO sales ({SALE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
        );
        sqlx::query(&sql)
            .bind(s.id.0)
            .bind(s.customer_id.0)
            .bind(s.vehicle_id.0)
            .bind(s.agency_id.map(|a| a.0))
            .bind(s.branch_id.map(|b| b.0))
            .bind(s.package_id.0)
            .bind(s.price)
            .bind(s.commission)
            .bind(s.branch_commission)
            .bind(s.agency_commission)
            .bind(s.start_date)
            .bind(s.end_date)
            .bind(&s.policy_number)
            .bind(s.is_refunded)
            .bind(s.refunded_at)
            .bind(s.refund_amount)
            .bind(&s.refund_reason)
            .bind(&s.refunded_by)
            .bind(s.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify_insert(e, "sale", s.id))?;
        Ok(())
    }

    async fn update_sale(&mut self, s: &Sale) -> Result<(), StoreError> {
        // Commission and pricing columns are frozen at creation.
        let result = sqlx::query(
            "UPDATE sales SET is_refunded = $2, refunded_at = $3, refund_amount = $4,
                    refund_reason = $5, refunded_by = $6
             WHERE id = $1",
        )
        .bind(s.id.0)
        .bind(s.is_refunded)
        .bind(s.refunded_at)
        .bind(s.refund_amount)
        .bind(&s.refund_reason)
        .bind(&s.refunded_by)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result, "sale", s.id)
    }

    async fn payment_for_sale(&mut self, sale_id: SaleId) -> Result<Option<Payment>, StoreError> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE sale_id = $1
             ORDER BY created_at LIMIT 1 FOR UPDATE"
        );
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(sale_id.0)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(PaymentRow::into_record)
            .transpose()
    }

    async fn insert_payment(&mut self, p: &Payment) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );
        sqlx::query(&sql)
            .bind(p.id.0)
            .bind(p.sale_id.0)
            .bind(p.agency_id.map(|a| a.0))
            .bind(p.amount)
            .bind(p.method.as_str())
            .bind(p.status.as_str())
            .bind(&p.transaction_id)
            .bind(&p.failure_reason)
            .bind(&p.provider_detail)
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify_insert(e, "payment", p.id))?;
        Ok(())
    }

    async fn update_payment(&mut self, p: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE payments SET amount = $2, status = $3, transaction_id = $4,
                    failure_reason = $5, provider_detail = $6, updated_at = $7
             WHERE id = $1",
        )
        .bind(p.id.0)
        .bind(p.amount)
        .bind(p.status.as_str())
        .bind(&p.transaction_id)
        .bind(&p.failure_reason)
        .bind(&p.provider_detail)
        .bind(p.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result, "payment", p.id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
