//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::{Backend, Context};
use crate::{api, config::ServerSettings};
use coursegate_core::{
    AccessDecision, CourseGateError, Dataset, EntityId, EntityKey, Evaluator, ProgressSnapshot,
    Timestamp, UserId, compute_blake3_hash, dataset_from_bytes, dataset_to_bytes,
    snapshot_checksum,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for a JSON dataset (100 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_DATASET_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum file size for a snapshot database (500 MB).
const MAX_SNAPSHOT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CourseGateError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CourseGateError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(CourseGateError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path, rejecting anything that is not a regular file.
///
/// Canonicalizing resolves "..", symlinks and validates existence.
fn validate_file_path(path: &Path) -> Result<PathBuf, CourseGateError> {
    let canonical = path.canonicalize().map_err(|e| {
        CourseGateError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(CourseGateError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, CourseGateError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        CourseGateError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(CourseGateError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| CourseGateError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Pretty-print a JSON value to stdout.
fn print_json(value: &impl serde::Serialize) -> Result<(), CourseGateError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| CourseGateError::SerializationError(e.to_string()))?;
    println!("{}", rendered);
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn date_or_dash(at: Option<Timestamp>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(ctx: &Context, settings: ServerSettings) -> Result<(), CourseGateError> {
    let evaluator = load_or_create_evaluator(&ctx.database, ctx.backend)?;
    if ctx.backend == Backend::File {
        tracing::warn!("File backend: records posted to the server are not written back to disk");
    }

    println!("Coursegate Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", settings.host);
    println!("  Port:     {}", settings.port);
    println!("  Backend:  {}", ctx.backend);
    println!("  Database: {:?}", ctx.database);
    println!();
    println!("Endpoints:");
    println!("  GET  /courses/{{id}}/access      - Evaluate access");
    println!("  GET  /courses/{{id}}/progress    - Learner progress");
    println!("  GET  /courses/{{id}}/enrollment  - Learner enrollment");
    println!("  GET  /courses/{{id}}/capacity    - Seat availability");
    println!("  POST /records/status           - Record an enrollment status");
    println!("  POST /records/completion       - Record a completion");
    println!("  POST /export                   - Export snapshot");
    println!("  GET  /status                   - Catalog status");
    println!("  GET  /health                   - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(settings, evaluator).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show catalog status.
pub fn cmd_status(ctx: &Context) -> Result<(), CourseGateError> {
    let evaluator = load_or_create_evaluator(&ctx.database, ctx.backend)?;
    let metrics = evaluator.metrics();

    if ctx.json_mode {
        let output = serde_json::json!({
            "database": ctx.database.to_string_lossy(),
            "backend": ctx.backend.to_string(),
            "course_count": metrics.course_count,
            "section_count": metrics.section_count,
            "lesson_count": metrics.lesson_count,
            "status_row_count": metrics.status_row_count,
            "active_enrollment_count": metrics.active_enrollment_count,
            "completion_count": metrics.completion_count,
            "lessons_per_course_thousandths": metrics.lessons_per_course_thousandths
        });
        return print_json(&output);
    }

    println!("Coursegate Catalog Status");
    println!("=========================");
    println!("Database: {:?}", ctx.database);
    println!("Backend:  {}", ctx.backend);
    println!();
    println!("Courses:            {}", metrics.course_count);
    println!("Sections:           {}", metrics.section_count);
    println!("Lessons:            {}", metrics.lesson_count);
    println!("Status Rows:        {}", metrics.status_row_count);
    println!("Active Enrollments: {}", metrics.active_enrollment_count);
    println!("Completions:        {}", metrics.completion_count);
    println!(
        "Lessons / Course:   {}.{:03}",
        metrics.lessons_per_course_thousandths / 1000,
        metrics.lessons_per_course_thousandths % 1000
    );

    if ctx.verbose {
        println!();
        println!("Courses:");
        for course in evaluator.courses() {
            println!(
                "  {:>6}  {}  (enrolled: {})",
                course.id.0,
                course.title,
                evaluator.count_enrolled(course.id)
            );
        }
    }

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize new database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), CourseGateError> {
    let db_path = &ctx.database;
    if db_path.exists() {
        if !force {
            return Err(CourseGateError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| CourseGateError::IoError(format!("Remove existing database: {}", e)))?;
    }

    match ctx.backend {
        Backend::Redb => {
            let _evaluator = Evaluator::with_redb(db_path)?;
            println!("Initialized new redb database at {:?}", db_path);
        }
        Backend::File => {
            save_evaluator(&Evaluator::new(), db_path)?;
            println!("Initialized new file database at {:?}", db_path);
        }
    }

    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Load a JSON dataset into the database.
pub fn cmd_load(ctx: &Context, file: &Path) -> Result<(), CourseGateError> {
    tracing::info!("Loading dataset from {:?}", file);

    let validated_path = validate_file_path(file)?;
    validate_file_size(&validated_path, MAX_DATASET_FILE_SIZE)?;

    let contents = std::fs::read(&validated_path)
        .map_err(|e| CourseGateError::IoError(format!("Read file: {}", e)))?;
    let dataset: Dataset = serde_json::from_slice(&contents)
        .map_err(|e| CourseGateError::DeserializationError(format!("Dataset JSON: {}", e)))?;

    let mut evaluator = load_or_create_evaluator(&ctx.database, ctx.backend)?;
    let report = evaluator.load_dataset(&dataset)?;
    if evaluator.is_persistent() {
        evaluator.compact()?;
    }
    save_evaluator(&evaluator, &ctx.database)?;

    if ctx.json_mode {
        return print_json(&report);
    }

    println!("Loaded dataset from {:?}", validated_path);
    println!("  Courses:     {}", report.courses);
    println!("  Sections:    {}", report.sections);
    println!("  Lessons:     {}", report.lessons);
    println!("  Status Rows: {}", report.status_rows);
    println!(
        "  Completions: {} ({} already recorded)",
        report.completions, report.completions_unchanged
    );

    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Export the catalog as a binary snapshot or a JSON dataset.
pub fn cmd_export(ctx: &Context, output: &Path, format: &str) -> Result<(), CourseGateError> {
    let validated_output = validate_output_path(output)?;

    let evaluator = load_or_create_evaluator(&ctx.database, ctx.backend)?;
    let dataset = evaluator.export_dataset()?;

    let data = match format {
        "snapshot" => {
            let data = dataset_to_bytes(&dataset)?;
            println!("Checksum: {}", snapshot_checksum(&data));
            data
        }
        "json" => serde_json::to_vec_pretty(&dataset)
            .map_err(|e| CourseGateError::SerializationError(e.to_string()))?,
        _ => {
            return Err(CourseGateError::SerializationError(format!(
                "Unknown format: {}. Use: snapshot, json",
                format
            )));
        }
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| CourseGateError::IoError(format!("Write file: {}", e)))?;

    println!(
        "Exported {} records ({} bytes) to {:?}",
        dataset.record_count(),
        data.len(),
        validated_output
    );

    Ok(())
}

// =============================================================================
// ENROLLMENT COMMAND
// =============================================================================

/// Show one learner's enrollment in one course.
pub fn cmd_enrollment(ctx: &Context, course: u64, user: u64) -> Result<(), CourseGateError> {
    let evaluator = load_or_create_evaluator(&ctx.database, ctx.backend)?;
    let course = EntityId(course);
    if evaluator.course(course).is_none() {
        return Err(CourseGateError::NotFound(EntityKey::course(course)));
    }

    let record = evaluator.enrollment_record(course, UserId(user));

    if ctx.json_mode {
        return print_json(&record);
    }

    println!("Enrollment: course {} / user {}", record.course.0, record.user.0);
    println!("  Status:          {}", record.status);
    println!("  Enrolled Since:  {}", date_or_dash(record.enrollment_date));
    println!("  Completed:       {}", date_or_dash(record.completion_date));

    Ok(())
}

// =============================================================================
// ACCESS COMMAND
// =============================================================================

/// Evaluate course access, optionally at a fixed instant.
pub fn cmd_access(
    ctx: &Context,
    course: u64,
    user: u64,
    now: Option<&str>,
) -> Result<(), CourseGateError> {
    let evaluator = load_or_create_evaluator(&ctx.database, ctx.backend)?;
    let now = match now {
        Some(raw) => Timestamp::parse(raw).ok_or_else(|| {
            CourseGateError::InvalidConfiguration(format!("Unrecognised instant: {}", raw))
        })?,
        None => evaluator.now(),
    };

    let course = EntityId(course);
    let decision = evaluator
        .access_at(course, UserId(user), now)
        .ok_or(CourseGateError::NotFound(EntityKey::course(course)))?;

    if ctx.json_mode {
        return print_json(&decision);
    }

    print_access(&decision);
    Ok(())
}

fn print_access(decision: &AccessDecision) {
    println!(
        "Access: course {} / user {} at {}",
        decision.course.0, decision.user.0, decision.now
    );
    if let Some(start) = decision.start_date {
        println!("  Starts:            {}", start);
    }
    println!("  Content Window:    {:?}", decision.content);
    println!("  Enrollment Window: {:?}", decision.enrollment);
    println!("  Status:            {}", decision.status);
    println!("  Has Capacity:      {}", yes_no(decision.has_capacity));
    if decision.has_prerequisite {
        println!("  Prerequisite Met:  {}", yes_no(decision.prerequisite_met));
    }
    println!();
    println!("  Can View Content:  {}", yes_no(decision.can_view_content));
    println!("  Can Enroll:        {}", yes_no(decision.can_enroll));
    println!("  Can Open Lessons:  {}", yes_no(decision.can_access_lessons));
    if let Some(block) = decision.blocked_by {
        println!("  Blocked By:        {:?}", block);
    }
    if let Some(notice) = &decision.notice {
        println!();
        println!("  Notice: {}", notice);
    }
}

// =============================================================================
// PROGRESS COMMAND
// =============================================================================

/// Show a learner's progress through a course.
pub fn cmd_progress(ctx: &Context, course: u64, user: u64) -> Result<(), CourseGateError> {
    let evaluator = load_or_create_evaluator(&ctx.database, ctx.backend)?;
    let course = EntityId(course);
    let snapshot = evaluator
        .compute_progress(course, UserId(user))
        .ok_or(CourseGateError::NotFound(EntityKey::course(course)))?;

    if ctx.json_mode {
        let output = serde_json::json!({
            "percent_complete": snapshot.percent_complete(),
            "next_lesson": snapshot.next_incomplete_lesson().map(|id| id.0),
            "snapshot": snapshot,
        });
        return print_json(&output);
    }

    print_progress(&snapshot, ctx.verbose);
    Ok(())
}

fn print_progress(snapshot: &ProgressSnapshot, verbose: bool) {
    println!(
        "Progress: course {} / user {}",
        snapshot.course.0, snapshot.user.0
    );
    println!("  Status:          {}", snapshot.status);
    println!("  Enrolled Since:  {}", date_or_dash(snapshot.enrollment_date));
    println!(
        "  Lessons:         {} / {} ({}%)",
        snapshot.completed_lesson_count(),
        snapshot.lessons.len(),
        snapshot.percent_complete()
    );
    if snapshot.is_complete {
        println!("  Completed:       {}", date_or_dash(snapshot.completed_date));
    } else if let Some(next) = snapshot.next_incomplete_lesson() {
        println!("  Next Lesson:     {}", next.0);
    }

    if verbose {
        println!();
        for section in &snapshot.sections {
            let mark = if section.is_complete { 'x' } else { ' ' };
            println!("  [{}] {} {}", mark, section.id.0, section.title);
            for lesson in snapshot
                .lessons
                .iter()
                .filter(|l| l.parent_section == section.id)
            {
                let mark = if lesson.is_complete { 'x' } else { ' ' };
                println!("      [{}] {} {}", mark, lesson.id.0, lesson.title);
            }
        }
    }
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Compute BLAKE3 cryptographic hash of the catalog snapshot.
pub fn cmd_hash(ctx: &Context) -> Result<(), CourseGateError> {
    let evaluator = load_or_create_evaluator(&ctx.database, ctx.backend)?;
    let data = dataset_to_bytes(&evaluator.export_dataset()?)?;

    let hash = compute_blake3_hash(&data);
    let checksum = snapshot_checksum(&data);

    if ctx.json_mode {
        let output = serde_json::json!({
            "algorithm": "blake3",
            "hash": hash,
            "checksum": checksum,
            "bytes": data.len(),
        });
        return print_json(&output);
    }

    println!("BLAKE3:   {}", hash);
    println!("Checksum: {}", checksum);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the database with the given backend, creating it when missing.
///
/// The file backend accepts a binary snapshot or a JSON dataset.
pub fn load_or_create_evaluator(
    db_path: &Path,
    backend: Backend,
) -> Result<Evaluator, CourseGateError> {
    match backend {
        Backend::Redb => Evaluator::with_redb(db_path),
        Backend::File => {
            if !db_path.exists() {
                return Ok(Evaluator::new());
            }

            validate_file_size(db_path, MAX_SNAPSHOT_FILE_SIZE)?;
            let data = std::fs::read(db_path)
                .map_err(|e| CourseGateError::IoError(format!("Read db: {}", e)))?;

            let dataset = match dataset_from_bytes(&data) {
                Ok(dataset) => dataset,
                Err(snapshot_err) => serde_json::from_slice::<Dataset>(&data).map_err(|_| {
                    CourseGateError::DeserializationError(format!(
                        "Could not parse database file: {}",
                        snapshot_err
                    ))
                })?,
            };

            let mut evaluator = Evaluator::new();
            evaluator.load_dataset(&dataset)?;
            Ok(evaluator)
        }
    }
}

/// Write an in-memory evaluator back to its snapshot file.
///
/// A redb evaluator is already persisted, so this is a no-op for it.
pub fn save_evaluator(evaluator: &Evaluator, db_path: &Path) -> Result<(), CourseGateError> {
    if evaluator.is_persistent() {
        return Ok(());
    }
    let data = dataset_to_bytes(&evaluator.export_dataset()?)?;
    std::fs::write(db_path, &data)
        .map_err(|e| CourseGateError::IoError(format!("Write db: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
