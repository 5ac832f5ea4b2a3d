//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Every variant, in seed order.
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Return the lowercase name stored in the lookup table.
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }

            /// Resolve a database status ID back into the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Image job lifecycle status.
    ///
    /// Moves along `pending -> processing -> {completed | failed}`. A broker
    /// retry after a failed attempt re-enters `processing` from `failed`.
    JobStatus {
        Pending = 1 => "pending",
        Processing = 2 => "processing",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
    }
}

define_status_enum! {
    /// Broker task delivery status.
    TaskStatus {
        Pending = 1 => "pending",
        Active = 2 => "active",
        Completed = 3 => "completed",
        Retry = 4 => "retry",
        Dead = 5 => "dead",
    }
}

impl JobStatus {
    /// Statuses a row must currently hold for a write of `self` to apply.
    ///
    /// `pending` is only ever written on insert, so no prior state admits it.
    /// A row that is already `completed` never moves again, which keeps a
    /// stale duplicate delivery from regressing a finished job.
    pub fn allowed_predecessors(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[],
            JobStatus::Processing => &[
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Failed,
            ],
            JobStatus::Completed | JobStatus::Failed => &[JobStatus::Processing],
        }
    }

    /// Whether a row in status `self` may be moved to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        next.allowed_predecessors().contains(&self)
    }

    /// `completed` and `failed` are terminal for a single delivery.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
