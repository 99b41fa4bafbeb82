// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros so handlers and services emit the same field
/// names (`question_id`, `assignment_id`, `student_assignment_id`, `user_id`)
/// and the same message shapes.

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, question_id = $question_id:expr) => {
        tracing::debug!(
            operation = $operation,
            question_id = %$question_id,
            "API operation started"
        );
    };
    ($operation:expr, assignment_id = $assignment_id:expr) => {
        tracing::debug!(
            operation = $operation,
            assignment_id = %$assignment_id,
            "API operation started"
        );
    };
    ($operation:expr, student_assignment_id = $id:expr) => {
        tracing::debug!(
            operation = $operation,
            student_assignment_id = %$id,
            "API operation started"
        );
    };
    ($operation:expr, user_id = $user_id:expr) => {
        tracing::debug!(
            operation = $operation,
            user_id = %$user_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "API operation started"
        );
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, question_id = $question_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            question_id = %$question_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, assignment_id = $assignment_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            assignment_id = %$assignment_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, student_assignment_id = $id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            student_assignment_id = %$id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API operation errors with consistent structure
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, question_id = $question_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            question_id = %$question_id,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, assignment_id = $assignment_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            assignment_id = %$assignment_id,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, question_id = $question_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            question_id = %$question_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, student_assignment_id = $id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            student_assignment_id = %$id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            "API operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Service Layer Logging Macros
// ============================================================================

/// Log service operation start with context
#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, question_id = $question_id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            question_id = %$question_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr, assignment_id = $assignment_id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            assignment_id = %$assignment_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr, student_assignment_id = $id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            student_assignment_id = %$id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation started"
        );
    };
}

/// Log service operation success
#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, question_id = $question_id:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            question_id = %$question_id,
            "Service operation completed: {}", $msg
        );
    };
    ($service:expr, $operation:expr, assignment_id = $assignment_id:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            assignment_id = %$assignment_id,
            "Service operation completed: {}", $msg
        );
    };
    ($service:expr, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            count = $count,
            duration_ms = $duration,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation completed: {}", $msg
        );
    };
}

/// Log service operation errors
#[macro_export]
macro_rules! log_service_error {
    ($service:expr, $operation:expr, student_assignment_id = $id:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            student_assignment_id = %$id,
            error = %$error,
            "Service operation failed"
        );
    };
    ($service:expr, $operation:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            error = %$error,
            "Service operation failed"
        );
    };
}

/// Log service warnings
#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(
            service = $service,
            operation = $operation,
            "Service warning: {}",
            $msg
        );
    };
}

// ============================================================================
// Database Operation Logging Macros
// ============================================================================

/// Log database operation performance and results
#[macro_export]
macro_rules! log_db_operation {
    (debug, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            result_count = $count,
            duration_ms = $duration,
            "Database operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "database",
            operation = $operation,
            "Database operation: {}", $msg
        );
    };
    (error, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = "database",
            operation = $operation,
            error = %$error,
            "Database operation failed"
        );
    };
}

// ============================================================================
// Grading Logging Macros
// ============================================================================

/// Log auto-grading and teacher grading of a student assignment
#[macro_export]
macro_rules! log_grading {
    (auto, student_assignment_id = $id:expr, score = $score:expr, total = $total:expr, correct = $correct:expr) => {
        tracing::info!(
            component = "grading",
            grading_kind = "auto",
            student_assignment_id = %$id,
            score = $score,
            total_questions = $total,
            correct_questions = $correct,
            "Submission auto-graded"
        );
    };
    (skipped, student_assignment_id = $id:expr, $msg:expr) => {
        tracing::debug!(
            component = "grading",
            grading_kind = "auto",
            student_assignment_id = %$id,
            "Auto-grading skipped: {}", $msg
        );
    };
    (teacher, student_assignment_id = $id:expr, grade = $grade:expr, overrides = $overrides:expr) => {
        tracing::info!(
            component = "grading",
            grading_kind = "teacher",
            student_assignment_id = %$id,
            grade = ?$grade,
            override_count = $overrides,
            "Submission graded by teacher"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Performance Logging Macros
// ============================================================================

/// Log performance metrics with consistent structure
#[macro_export]
macro_rules! log_performance {
    ($operation:expr, duration_ms = $duration:expr, throughput = $throughput:expr) => {
        tracing::debug!(
            event_type = "performance",
            operation = $operation,
            duration_ms = $duration,
            throughput_ops_per_sec = $throughput,
            "Performance metrics"
        );
    };
    ($operation:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            event_type = "performance",
            operation = $operation,
            duration_ms = $duration,
            "Performance metrics"
        );
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    #[test]
    fn test_logging_macros_compile() {
        let question_id = Uuid::new_v4();
        let assignment_id = Uuid::new_v4();
        let row_id = Uuid::new_v4();
        let error = anyhow::anyhow!("test error");

        log_api_start!("test_operation", question_id = question_id);
        log_api_start!("test_operation", assignment_id = assignment_id);
        log_api_start!("test_operation", student_assignment_id = row_id);
        log_api_start!("test_operation", user_id = "teacher-1");
        log_api_start!("test_operation");

        log_api_success!("test_operation", question_id = question_id, "question stored");
        log_api_success!("test_operation", count = 5, "questions listed");

        log_api_warn!("test_operation", student_assignment_id = row_id, "conflict");
        log_api_error!("test_operation", error = error, "storage failure");

        log_service_start!("assignment_service", "create_assignment", assignment_id = assignment_id);
        log_service_success!("question_service", "create_question", "question created successfully");
        log_service_warn!("assignment_service", "load_quiz", "artifact is not a quiz");

        log_db_operation!(debug, "list_questions", count = 3, duration_ms = 10);
        log_db_operation!(info, "migration", "database initialized");

        log_grading!(auto, student_assignment_id = row_id, score = 50.0, total = 2, correct = 1);
        log_grading!(skipped, student_assignment_id = row_id, "no gradable questions");
        log_grading!(teacher, student_assignment_id = row_id, grade = Some(75.0), overrides = 1);

        log_system_event!(startup, component = "server", "server starting");
        log_system_event!(config, "configuration loaded successfully");

        log_performance!("regrade", duration_ms = 2500, throughput = 100);
        log_performance!("single_operation", duration_ms = 50);

        log_validation!(success, "api_request", "request validated");
    }
}
