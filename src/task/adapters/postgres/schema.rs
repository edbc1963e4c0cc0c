//! Diesel schema for task lifecycle persistence.

diesel::table! {
    /// Task records with their current workflow status.
    tasks (id) {
        /// Internal task identifier.
        id -> Uuid,
        /// Task title.
        #[max_length = 255]
        title -> Varchar,
        /// Optional free-form description.
        description -> Nullable<Text>,
        /// Workflow status.
        #[max_length = 50]
        status -> Varchar,
        /// Creating user.
        author_id -> Uuid,
        /// Optional assigned user.
        assignee_id -> Nullable<Uuid>,
        /// Optimistic-concurrency revision.
        revision -> Int8,
        /// Number of recorded status transitions.
        status_changes -> Int8,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// First completion timestamp.
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Append-only status transition records.
    task_status_history (id) {
        /// History record identifier.
        id -> Uuid,
        /// Owning task identifier.
        task_id -> Uuid,
        /// 1-based position within the task's history.
        sequence -> Int8,
        /// Status before the transition.
        #[max_length = 50]
        old_status -> Varchar,
        /// Status after the transition.
        #[max_length = 50]
        new_status -> Varchar,
        /// User that caused the transition.
        changed_by -> Uuid,
        /// Transition timestamp.
        changed_at -> Timestamptz,
    }
}

diesel::joinable!(task_status_history -> tasks (task_id));
diesel::allow_tables_to_appear_in_same_query!(tasks, task_status_history);
