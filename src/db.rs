use crate::model::{
    Assessment, Ilo, OutcomeMapping, OutcomeReference, ReferenceType, ScoreRecord, Student,
    SubmissionStatus, Thresholds,
};
use crate::snapshot::SnapshotInput;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "attaind.sqlite3";
pub const THRESHOLDS_KEY: &str = "thresholds";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            title TEXT NOT NULL,
            section_code TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            student_number TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course_sort ON students(course_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            title TEXT NOT NULL,
            criterion TEXT,
            total_points REAL NOT NULL,
            weight_percentage REAL NOT NULL,
            task_code TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_course ON assessments(course_id, idx)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            assessment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            raw_score REAL,
            late_penalty REAL NOT NULL DEFAULT 0,
            submission_status TEXT NOT NULL,
            remarks TEXT,
            graded_at TEXT,
            PRIMARY KEY(assessment_id, student_id),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ilos(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ilo_mappings(
            ilo_id TEXT NOT NULL,
            reference_type TEXT NOT NULL,
            reference_id TEXT NOT NULL,
            code TEXT,
            description TEXT,
            task_codes TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(ilo_id, reference_type, reference_id),
            FOREIGN KEY(ilo_id) REFERENCES ilos(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS outcome_references(
            reference_type TEXT NOT NULL,
            reference_id TEXT NOT NULL,
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            PRIMARY KEY(reference_type, reference_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(
            serde_json::from_str(&text).with_context(|| format!("settings.{} is not JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

/// Workspace threshold defaults; absent fields keep the built-in defaults.
pub fn load_thresholds(conn: &Connection) -> anyhow::Result<Thresholds> {
    match settings_get_json(conn, THRESHOLDS_KEY)? {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(Thresholds::default()),
    }
}

pub fn course_exists(conn: &Connection, course_id: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn assessment_scale(
    conn: &Connection,
    assessment_id: &str,
) -> anyhow::Result<Option<(String, f64, f64)>> {
    Ok(conn
        .query_row(
            "SELECT course_id, total_points, weight_percentage FROM assessments WHERE id = ?",
            [assessment_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?)
}

pub fn upsert_score(
    conn: &Connection,
    record: &ScoreRecord,
    remarks: Option<&str>,
) -> anyhow::Result<()> {
    let graded_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO scores(assessment_id, student_id, raw_score, late_penalty, submission_status, remarks, graded_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(assessment_id, student_id) DO UPDATE SET
           raw_score = excluded.raw_score,
           late_penalty = excluded.late_penalty,
           submission_status = excluded.submission_status,
           remarks = excluded.remarks,
           graded_at = excluded.graded_at",
        (
            &record.assessment_id,
            &record.student_id,
            record.raw_score,
            record.late_penalty,
            record.submission_status.as_str(),
            remarks,
            &graded_at,
        ),
    )?;
    Ok(())
}

/// Everything the engine needs for one course, in display order.
pub fn load_snapshot_input(conn: &Connection, course_id: &str) -> anyhow::Result<SnapshotInput> {
    let mut stmt = conn.prepare(
        "SELECT id, display_name, student_number
         FROM students
         WHERE course_id = ?
         ORDER BY sort_order",
    )?;
    let students = stmt
        .query_map([course_id], |r| {
            Ok(Student {
                id: r.get(0)?,
                display_name: r.get(1)?,
                student_number: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, title, criterion, total_points, weight_percentage, task_code
         FROM assessments
         WHERE course_id = ?
         ORDER BY idx",
    )?;
    let assessments = stmt
        .query_map([course_id], |r| {
            Ok(Assessment {
                id: r.get(0)?,
                title: r.get(1)?,
                criterion: r.get(2)?,
                total_points: r.get(3)?,
                weight_percentage: r.get(4)?,
                task_code: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT sc.assessment_id, sc.student_id, sc.raw_score, sc.late_penalty, sc.submission_status
         FROM scores sc
         JOIN assessments a ON a.id = sc.assessment_id
         JOIN students s ON s.id = sc.student_id
         WHERE a.course_id = ?1 AND s.course_id = ?1
         ORDER BY a.idx, s.sort_order",
    )?;
    let scores = stmt
        .query_map([course_id], |r| {
            let status: String = r.get(4)?;
            Ok(ScoreRecord {
                assessment_id: r.get(0)?,
                student_id: r.get(1)?,
                raw_score: r.get(2)?,
                late_penalty: r.get(3)?,
                submission_status: SubmissionStatus::parse_lenient(&status),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, code, description
         FROM ilos
         WHERE course_id = ?
         ORDER BY sort_order",
    )?;
    let mut ilos = stmt
        .query_map([course_id], |r| {
            Ok(Ilo {
                id: r.get(0)?,
                code: r.get(1)?,
                description: r.get(2)?,
                mappings: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut map_stmt = conn.prepare(
        "SELECT reference_type, reference_id, code, description, task_codes
         FROM ilo_mappings
         WHERE ilo_id = ?
         ORDER BY sort_order",
    )?;
    for ilo in &mut ilos {
        let rows = map_stmt
            .query_map([&ilo.id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (rtype, reference_id, code, description, task_codes) in rows {
            let reference_type = ReferenceType::parse(&rtype)
                .with_context(|| format!("ILO {} has unknown reference type {}", ilo.code, rtype))?;
            let task_codes: Vec<String> = serde_json::from_str(&task_codes)
                .with_context(|| format!("ILO {} task codes are not a JSON array", ilo.code))?;
            ilo.mappings.push(OutcomeMapping {
                reference_type,
                reference_id,
                code,
                description,
                task_codes,
            });
        }
    }

    let mut stmt = conn.prepare(
        "SELECT reference_type, reference_id, code, description
         FROM outcome_references
         ORDER BY reference_type, code",
    )?;
    let raw_refs = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut references = Vec::with_capacity(raw_refs.len());
    for (rtype, reference_id, code, description) in raw_refs {
        let Some(reference_type) = ReferenceType::parse(&rtype) else {
            tracing::warn!(reference_type = %rtype, "skipping catalog entry with unknown type");
            continue;
        };
        references.push(OutcomeReference {
            reference_type,
            reference_id,
            code,
            description,
        });
    }

    Ok(SnapshotInput {
        course_id: Some(course_id.to_string()),
        assessments,
        students,
        scores,
        ilos,
        references,
    })
}
