//! Operator confirmation for data-modifying statements.
//!
//! Every modifying statement the agent wants to run is shown to the
//! operator first. The operator may allow it once, allow every further
//! modification for the lifetime of the process, or deny it.
use std::io::{self, BufRead as _, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

/// Operator decision on a modifying statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// Run this statement.
    Once,
    /// Run this and every later statement without asking.
    All,
    /// Refuse.
    Denied,
}

impl Approval {
    /// Interpret an answer to `Allow this operation? (y/n/all)`.
    #[must_use]
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_lowercase().as_str() {
            "all" => Self::All,
            "y" => Self::Once,
            _ => Self::Denied,
        }
    }
}

/// Something that can ask the operator.
#[async_trait]
pub trait Approver: Send + Sync {
    /// Ask whether `query` with `params` may run.
    async fn approve(&self, query: &str, params: &[Value]) -> Approval;
}

/// Asks on the terminal the process runs in.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleApprover;

#[async_trait]
impl Approver for ConsoleApprover {
    #[allow(clippy::print_stdout)]
    async fn approve(&self, query: &str, params: &[Value]) -> Approval {
        let query = query.to_owned();
        let params = params.to_vec();
        let answer = tokio::task::spawn_blocking(move || {
            println!("\n=== Data Modification Request ===");
            println!("Query: {query}");
            if !params.is_empty() {
                println!("Parameters: {}", Value::Array(params));
            }
            print!("Allow this operation? (y/n/all): ");
            io::stdout().flush()?;
            let mut answer = String::new();
            io::stdin().lock().read_line(&mut answer)?;
            Ok::<String, io::Error>(answer)
        })
        .await;
        match answer {
            Ok(Ok(answer)) => Approval::from_answer(&answer),
            Ok(Err(err)) => {
                tracing::warn!("Could not read approval: {err}");
                Approval::Denied
            }
            Err(err) => {
                tracing::warn!("Approval prompt failed: {err}");
                Approval::Denied
            }
        }
    }
}

/// Shared gate in front of modifying statements.
pub struct ModificationGate {
    /// Who to ask.
    approver: Arc<dyn Approver>,
    /// Set once the operator answered `all`.
    allow_all: AtomicBool,
    /// One question at a time.
    asking: Mutex<()>,
}

impl std::fmt::Debug for ModificationGate {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter
            .debug_struct("ModificationGate")
            .field("allow_all", &self.allow_all.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ModificationGate {
    /// Gate asking `approver`.
    #[must_use]
    pub fn new(approver: Arc<dyn Approver>) -> Self {
        Self {
            approver,
            allow_all: AtomicBool::new(false),
            asking: Mutex::new(()),
        }
    }

    /// Gate asking on the terminal.
    #[must_use]
    pub fn console() -> Self {
        Self::new(Arc::new(ConsoleApprover))
    }

    /// Whether the operator already allowed everything.
    #[must_use]
    pub fn allows_all(&self) -> bool {
        self.allow_all.load(Ordering::SeqCst)
    }

    /// Decide whether a modifying statement may run.
    pub async fn permit(&self, query: &str, params: &[Value]) -> bool {
        if self.allows_all() {
            return true;
        }
        let _guard = self.asking.lock().await;
        // Another request may have been granted `all` while we waited.
        if self.allows_all() {
            return true;
        }
        match self.approver.approve(query, params).await {
            Approval::All => {
                self.allow_all.store(true, Ordering::SeqCst);
                tracing::info!("Operator allowed all further data modifications");
                true
            }
            Approval::Once => true,
            Approval::Denied => {
                tracing::info!(query, "Operator denied data modification");
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Replies with a fixed answer and counts questions.
    struct Fixed {
        answer: Approval,
        asked: AtomicUsize,
    }

    #[async_trait]
    impl Approver for Fixed {
        async fn approve(&self, _query: &str, _params: &[Value]) -> Approval {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn fixed(answer: Approval) -> Arc<Fixed> {
        Arc::new(Fixed {
            answer,
            asked: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_from_answer_expect_case_insensitive() {
        assert_eq!(Approval::from_answer("Y\n"), Approval::Once);
        assert_eq!(Approval::from_answer(" ALL "), Approval::All);
        assert_eq!(Approval::from_answer("yes"), Approval::Denied);
        assert_eq!(Approval::from_answer(""), Approval::Denied);
    }

    #[actix_web::test]
    async fn test_permit_when_all_expect_no_further_questions() {
        let approver = fixed(Approval::All);
        let gate = ModificationGate::new(approver.clone());
        assert!(gate.permit("DELETE FROM a", &[]).await);
        assert!(gate.permit("DELETE FROM b", &[]).await);
        assert!(gate.allows_all());
        assert_eq!(approver.asked.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_permit_when_once_expect_asked_every_time() {
        let approver = fixed(Approval::Once);
        let gate = ModificationGate::new(approver.clone());
        assert!(gate.permit("UPDATE a SET x = 1", &[]).await);
        assert!(gate.permit("UPDATE a SET x = 2", &[]).await);
        assert!(!gate.allows_all());
        assert_eq!(approver.asked.load(Ordering::SeqCst), 2);
    }

    #[actix_web::test]
    async fn test_permit_when_denied_expect_false() {
        let gate = ModificationGate::new(fixed(Approval::Denied));
        assert!(!gate.permit("DROP TABLE a", &[]).await);
    }
}
