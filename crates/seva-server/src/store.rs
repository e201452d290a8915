use async_trait::async_trait;
use chrono::{Datelike, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use seva_config::Config;
use seva_contracts::{
    ApplicantDetails, BirthCertificate, CertificateApplication, Grievance, RecordStatus,
    SchemeReport, StatusReport,
};
use seva_kernel::format::application_id;
use seva_kernel::workflow::{BirthDraft, CertificateDraft, GrievanceDraft};
use thiserror::Error;
use tokio::sync::Mutex;

const ID_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failed: {0}")]
    Backend(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("stored record is malformed: {0}")]
    Malformed(String),
    #[error("could not allocate a unique application id")]
    IdExhausted,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Persistence for the three record kinds and generated scheme reports.
#[async_trait]
pub trait RecordService: Send + Sync {
    async fn create_application(
        &self,
        user_id: &str,
        draft: &CertificateDraft,
    ) -> Result<CertificateApplication, StoreError>;
    async fn list_applications(
        &self,
        user_id: &str,
    ) -> Result<Vec<CertificateApplication>, StoreError>;
    async fn update_application_status(
        &self,
        app_id: &str,
        status: RecordStatus,
    ) -> Result<(), StoreError>;

    async fn create_birth_certificate(
        &self,
        user_id: &str,
        draft: &BirthDraft,
    ) -> Result<BirthCertificate, StoreError>;
    async fn list_birth_certificates(
        &self,
        user_id: &str,
    ) -> Result<Vec<BirthCertificate>, StoreError>;

    async fn file_grievance(
        &self,
        user_id: &str,
        draft: &GrievanceDraft,
    ) -> Result<Grievance, StoreError>;
    async fn list_grievances(&self, user_id: &str) -> Result<Vec<Grievance>, StoreError>;
    async fn escalate_grievance(&self, id: &str) -> Result<(), StoreError>;

    async fn save_document(&self, report: &SchemeReport) -> Result<(), StoreError>;
    async fn get_document(&self, id: &str) -> Result<Option<SchemeReport>, StoreError>;
    /// Reports generated for a user, newest first.
    async fn list_documents(&self, user_id: &str) -> Result<Vec<SchemeReport>, StoreError>;

    /// All records of a user across the three kinds. A failing list is logged
    /// and reported as empty; the report fails only when every list fails.
    async fn status_report(&self, user_id: &str) -> Result<StatusReport, StoreError> {
        let applications = self.list_applications(user_id).await;
        let birth_certificates = self.list_birth_certificates(user_id).await;
        let grievances = self.list_grievances(user_id).await;
        match (applications, birth_certificates, grievances) {
            (Err(err), Err(_), Err(_)) => Err(err),
            (applications, birth_certificates, grievances) => Ok(StatusReport {
                applications: or_empty(user_id, "applications", applications),
                birth_certificates: or_empty(user_id, "birth_certificates", birth_certificates),
                grievances: or_empty(user_id, "grievances", grievances),
            }),
        }
    }
}

fn or_empty<T>(user_id: &str, kind: &str, listed: Result<Vec<T>, StoreError>) -> Vec<T> {
    listed.unwrap_or_else(|err| {
        tracing::warn!(user_id, kind, error = %err, "record list failed, reporting none");
        Vec::new()
    })
}

pub struct RecordStore {
    backend: Mutex<StoreBackend>,
}

impl RecordStore {
    pub fn memory() -> Self {
        Self {
            backend: Mutex::new(StoreBackend::Memory(MemoryStore::default())),
        }
    }

    pub fn sqlite(path: &str) -> Result<Self, StoreError> {
        Ok(Self {
            backend: Mutex::new(StoreBackend::Sqlite(SqliteStore::new(path)?)),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, StoreError> {
        if cfg.store.kind == "sqlite" {
            let path = cfg.store.sqlite_path.as_deref().ok_or_else(|| {
                StoreError::Backend("store.sqlite_path is required for sqlite store".to_string())
            })?;
            Self::sqlite(path)
        } else {
            Ok(Self::memory())
        }
    }
}

#[async_trait]
impl RecordService for RecordStore {
    async fn create_application(
        &self,
        user_id: &str,
        draft: &CertificateDraft,
    ) -> Result<CertificateApplication, StoreError> {
        let now = Utc::now();
        let mut store = self.backend.lock().await;
        for _ in 0..ID_ATTEMPTS {
            let app = CertificateApplication {
                app_id: application_id(now.year(), rand::thread_rng().gen_range(1000..10_000)),
                user_id: user_id.to_string(),
                cert_type: draft.cert_type.clone(),
                status: draft.status(),
                details: ApplicantDetails {
                    name: draft.name.clone(),
                    national_id: draft.national_id.clone(),
                    address: draft.address.clone(),
                    income: draft.income.clone(),
                },
                created_at: now.to_rfc3339(),
            };
            if store.insert_application(&app)? {
                tracing::debug!(app_id = %app.app_id, status = app.status.as_str(), "application stored");
                return Ok(app);
            }
        }
        Err(StoreError::IdExhausted)
    }

    async fn list_applications(
        &self,
        user_id: &str,
    ) -> Result<Vec<CertificateApplication>, StoreError> {
        self.backend.lock().await.list_applications(user_id)
    }

    async fn update_application_status(
        &self,
        app_id: &str,
        status: RecordStatus,
    ) -> Result<(), StoreError> {
        self.backend
            .lock()
            .await
            .update_application_status(app_id, status)
    }

    async fn create_birth_certificate(
        &self,
        user_id: &str,
        draft: &BirthDraft,
    ) -> Result<BirthCertificate, StoreError> {
        let record = BirthCertificate {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            child_name: draft.child_name.clone(),
            dob: draft.dob.clone(),
            place_of_birth: draft.place_of_birth.clone(),
            father_name: draft.father_name.clone(),
            mother_name: draft.mother_name.clone(),
            address: draft.address.clone(),
            status: RecordStatus::Approved,
            escalated: false,
            created_at: Utc::now().to_rfc3339(),
        };
        self.backend.lock().await.insert_birth(&record)?;
        Ok(record)
    }

    async fn list_birth_certificates(
        &self,
        user_id: &str,
    ) -> Result<Vec<BirthCertificate>, StoreError> {
        self.backend.lock().await.list_births(user_id)
    }

    async fn file_grievance(
        &self,
        user_id: &str,
        draft: &GrievanceDraft,
    ) -> Result<Grievance, StoreError> {
        let record = Grievance {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            department: draft.department.clone(),
            complaint: draft.complaint.clone(),
            status: RecordStatus::Submitted,
            escalated: false,
            created_at: Utc::now().to_rfc3339(),
        };
        self.backend.lock().await.insert_grievance(&record)?;
        Ok(record)
    }

    async fn list_grievances(&self, user_id: &str) -> Result<Vec<Grievance>, StoreError> {
        self.backend.lock().await.list_grievances(user_id)
    }

    async fn escalate_grievance(&self, id: &str) -> Result<(), StoreError> {
        self.backend.lock().await.escalate_grievance(id)
    }

    async fn save_document(&self, report: &SchemeReport) -> Result<(), StoreError> {
        self.backend.lock().await.save_document(report)
    }

    async fn get_document(&self, id: &str) -> Result<Option<SchemeReport>, StoreError> {
        self.backend.lock().await.get_document(id)
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<SchemeReport>, StoreError> {
        self.backend.lock().await.list_documents(user_id)
    }
}

/// Insertion-ordered; lists walk it backwards for newest first.
#[derive(Default)]
struct MemoryStore {
    applications: Vec<CertificateApplication>,
    births: Vec<BirthCertificate>,
    grievances: Vec<Grievance>,
    documents: Vec<SchemeReport>,
}

enum StoreBackend {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

struct SqliteStore {
    conn: Connection,
}

impl StoreBackend {
    /// `Ok(false)` when the id is already taken.
    fn insert_application(&mut self, app: &CertificateApplication) -> Result<bool, StoreError> {
        match self {
            StoreBackend::Memory(store) => {
                if store.applications.iter().any(|a| a.app_id == app.app_id) {
                    return Ok(false);
                }
                store.applications.push(app.clone());
                Ok(true)
            }
            StoreBackend::Sqlite(store) => store.insert_application(app),
        }
    }

    fn list_applications(&self, user_id: &str) -> Result<Vec<CertificateApplication>, StoreError> {
        match self {
            StoreBackend::Memory(store) => Ok(store
                .applications
                .iter()
                .rev()
                .filter(|a| a.user_id == user_id)
                .cloned()
                .collect()),
            StoreBackend::Sqlite(store) => store.list_applications(user_id),
        }
    }

    fn update_application_status(
        &mut self,
        app_id: &str,
        status: RecordStatus,
    ) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(store) => {
                let app = store
                    .applications
                    .iter_mut()
                    .find(|a| a.app_id == app_id)
                    .ok_or_else(|| StoreError::NotFound(app_id.to_string()))?;
                app.status = status;
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.update_application_status(app_id, status),
        }
    }

    fn insert_birth(&mut self, record: &BirthCertificate) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(store) => {
                store.births.push(record.clone());
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.insert_birth(record),
        }
    }

    fn list_births(&self, user_id: &str) -> Result<Vec<BirthCertificate>, StoreError> {
        match self {
            StoreBackend::Memory(store) => Ok(store
                .births
                .iter()
                .rev()
                .filter(|b| b.user_id == user_id)
                .cloned()
                .collect()),
            StoreBackend::Sqlite(store) => store.list_births(user_id),
        }
    }

    fn insert_grievance(&mut self, record: &Grievance) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(store) => {
                store.grievances.push(record.clone());
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.insert_grievance(record),
        }
    }

    fn list_grievances(&self, user_id: &str) -> Result<Vec<Grievance>, StoreError> {
        match self {
            StoreBackend::Memory(store) => Ok(store
                .grievances
                .iter()
                .rev()
                .filter(|g| g.user_id == user_id)
                .cloned()
                .collect()),
            StoreBackend::Sqlite(store) => store.list_grievances(user_id),
        }
    }

    fn escalate_grievance(&mut self, id: &str) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(store) => {
                let record = store
                    .grievances
                    .iter_mut()
                    .find(|g| g.id == id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                record.status = RecordStatus::Escalated;
                record.escalated = true;
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.escalate_grievance(id),
        }
    }

    fn save_document(&mut self, report: &SchemeReport) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(store) => {
                match store.documents.iter_mut().find(|d| d.id == report.id) {
                    Some(existing) => *existing = report.clone(),
                    None => store.documents.push(report.clone()),
                }
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.save_document(report),
        }
    }

    fn get_document(&self, id: &str) -> Result<Option<SchemeReport>, StoreError> {
        match self {
            StoreBackend::Memory(store) => {
                Ok(store.documents.iter().find(|d| d.id == id).cloned())
            }
            StoreBackend::Sqlite(store) => store.get_document(id),
        }
    }

    fn list_documents(&self, user_id: &str) -> Result<Vec<SchemeReport>, StoreError> {
        match self {
            StoreBackend::Memory(store) => Ok(store
                .documents
                .iter()
                .rev()
                .filter(|d| d.user_id == user_id)
                .cloned()
                .collect()),
            StoreBackend::Sqlite(store) => store.list_documents(user_id),
        }
    }
}

impl SqliteStore {
    fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS certificate_applications (
                app_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                cert_type TEXT NOT NULL,
                status TEXT NOT NULL,
                name TEXT NOT NULL,
                national_id TEXT NOT NULL,
                address TEXT NOT NULL,
                income TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS birth_certificates (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                child_name TEXT NOT NULL,
                dob TEXT NOT NULL,
                place_of_birth TEXT NOT NULL,
                father_name TEXT NOT NULL,
                mother_name TEXT NOT NULL,
                address TEXT NOT NULL,
                status TEXT NOT NULL,
                escalated INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS grievances (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                department TEXT NOT NULL,
                complaint TEXT NOT NULL,
                status TEXT NOT NULL,
                escalated INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scheme_reports (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                scheme_name TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self { conn })
    }

    fn insert_application(&mut self, app: &CertificateApplication) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "
            INSERT OR IGNORE INTO certificate_applications(
                app_id, user_id, cert_type, status, name, national_id, address, income, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                app.app_id,
                app.user_id,
                app.cert_type,
                app.status.as_str(),
                app.details.name,
                app.details.national_id,
                app.details.address,
                app.details.income,
                app.created_at
            ],
        )?;
        Ok(inserted == 1)
    }

    fn list_applications(&self, user_id: &str) -> Result<Vec<CertificateApplication>, StoreError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT app_id, user_id, cert_type, status, name, national_id, address, income, created_at
            FROM certificate_applications WHERE user_id = ?1 ORDER BY rowid DESC
            ",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    ApplicantDetails {
                        name: row.get(4)?,
                        national_id: row.get(5)?,
                        address: row.get(6)?,
                        income: row.get(7)?,
                    },
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(app_id, user_id, cert_type, status, details, created_at)| {
                Ok(CertificateApplication {
                    status: parse_status(&status)?,
                    app_id,
                    user_id,
                    cert_type,
                    details,
                    created_at,
                })
            })
            .collect()
    }

    fn update_application_status(
        &mut self,
        app_id: &str,
        status: RecordStatus,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE certificate_applications SET status = ?1 WHERE app_id = ?2",
            params![status.as_str(), app_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(app_id.to_string()));
        }
        Ok(())
    }

    fn insert_birth(&mut self, record: &BirthCertificate) -> Result<(), StoreError> {
        self.conn.execute(
            "
            INSERT INTO birth_certificates(
                id, user_id, child_name, dob, place_of_birth, father_name, mother_name,
                address, status, escalated, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                record.id,
                record.user_id,
                record.child_name,
                record.dob,
                record.place_of_birth,
                record.father_name,
                record.mother_name,
                record.address,
                record.status.as_str(),
                if record.escalated { 1 } else { 0 },
                record.created_at
            ],
        )?;
        Ok(())
    }

    fn list_births(&self, user_id: &str) -> Result<Vec<BirthCertificate>, StoreError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, child_name, dob, place_of_birth, father_name, mother_name,
                   address, status, escalated, created_at
            FROM birth_certificates WHERE user_id = ?1 ORDER BY rowid DESC
            ",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    [
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ],
                    row.get::<_, String>(8)?,
                    row.get::<_, i64>(9)?,
                    row.get::<_, String>(10)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(fields, status, escalated, created_at)| {
                let [id, user_id, child_name, dob, place_of_birth, father_name, mother_name, address] =
                    fields;
                Ok(BirthCertificate {
                    id,
                    user_id,
                    child_name,
                    dob,
                    place_of_birth,
                    father_name,
                    mother_name,
                    address,
                    status: parse_status(&status)?,
                    escalated: escalated != 0,
                    created_at,
                })
            })
            .collect()
    }

    fn insert_grievance(&mut self, record: &Grievance) -> Result<(), StoreError> {
        self.conn.execute(
            "
            INSERT INTO grievances(id, user_id, department, complaint, status, escalated, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                record.id,
                record.user_id,
                record.department,
                record.complaint,
                record.status.as_str(),
                if record.escalated { 1 } else { 0 },
                record.created_at
            ],
        )?;
        Ok(())
    }

    fn list_grievances(&self, user_id: &str) -> Result<Vec<Grievance>, StoreError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, department, complaint, status, escalated, created_at
            FROM grievances WHERE user_id = ?1 ORDER BY rowid DESC
            ",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(
                |(id, user_id, department, complaint, status, escalated, created_at)| {
                    Ok(Grievance {
                        id,
                        user_id,
                        department,
                        complaint,
                        status: parse_status(&status)?,
                        escalated: escalated != 0,
                        created_at,
                    })
                },
            )
            .collect()
    }

    fn escalate_grievance(&mut self, id: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE grievances SET status = ?1, escalated = 1 WHERE id = ?2",
            params![RecordStatus::Escalated.as_str(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn save_document(&mut self, report: &SchemeReport) -> Result<(), StoreError> {
        self.conn.execute(
            "
            INSERT OR REPLACE INTO scheme_reports(id, user_id, scheme_name, body, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                report.id,
                report.user_id,
                report.scheme_name,
                report.body,
                report.created_at
            ],
        )?;
        Ok(())
    }

    fn get_document(&self, id: &str) -> Result<Option<SchemeReport>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, scheme_name, body, created_at FROM scheme_reports WHERE id = ?1",
                params![id],
                report_from_row,
            )
            .optional()?)
    }

    fn list_documents(&self, user_id: &str) -> Result<Vec<SchemeReport>, StoreError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, scheme_name, body, created_at
            FROM scheme_reports WHERE user_id = ?1 ORDER BY rowid DESC
            ",
        )?;
        let reports = stmt
            .query_map(params![user_id], report_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reports)
    }
}

fn report_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SchemeReport> {
    Ok(SchemeReport {
        id: row.get(0)?,
        user_id: row.get(1)?,
        scheme_name: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn parse_status(value: &str) -> Result<RecordStatus, StoreError> {
    RecordStatus::parse(value).ok_or_else(|| StoreError::Malformed(format!("status {value:?}")))
}
