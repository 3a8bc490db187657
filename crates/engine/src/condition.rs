//! Resource-count conditions used by WAIT setup actions and CHECK post-checks.

use chiron_types::{EqualityOperator, ResourceCondition, UnsupportedOperator};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    pattern::name_matches,
    poller::{LookupError, ResourcePoller},
};

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error(transparent)]
    UnsupportedOperator(#[from] UnsupportedOperator),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Decides whether the live cluster satisfies a [`ResourceCondition`].
#[derive(Clone)]
pub struct ConditionEvaluator {
    poller: ResourcePoller,
    default_namespace: String,
}

impl ConditionEvaluator {
    pub fn new(poller: ResourcePoller, default_namespace: impl Into<String>) -> Self {
        Self {
            poller,
            default_namespace: default_namespace.into(),
        }
    }

    /// Evaluates the condition once against a fresh listing.
    ///
    /// Unsupported kinds count as "no resources". Lookup failures are returned as errors so a
    /// failed listing is never read as zero resources.
    pub async fn is_satisfied(&self, condition: &ResourceCondition) -> Result<bool, ConditionError> {
        let operator = parse_operator(condition)?;
        self.evaluate(condition, operator).await
    }

    /// Single evaluation with every failure folded into "not satisfied".
    pub async fn check(&self, condition: &ResourceCondition) -> bool {
        match self.is_satisfied(condition).await {
            Ok(satisfied) => satisfied,
            Err(error) => {
                debug!(kind = %condition.kind, %error, "condition treated as not satisfied");
                false
            }
        }
    }

    /// Polls until the condition holds.
    ///
    /// An unsupported operator fails immediately; lookup failures are retried on the next
    /// poll.
    pub async fn block_until_satisfied(&self, condition: &ResourceCondition) -> Result<(), ConditionError> {
        let operator = parse_operator(condition)?;
        self.poller
            .wait_until_satisfied(|| async move { self.evaluate(condition, operator).await.unwrap_or(false) })
            .await;
        debug!(kind = %condition.kind, namespace = %self.namespace_for(condition), "wait condition satisfied");
        Ok(())
    }

    fn namespace_for<'a>(&'a self, condition: &'a ResourceCondition) -> &'a str {
        condition.namespace.as_deref().unwrap_or(&self.default_namespace)
    }

    async fn evaluate(&self, condition: &ResourceCondition, operator: EqualityOperator) -> Result<bool, ConditionError> {
        let namespace = self.namespace_for(condition);
        let names = match self.poller.get_by_kind(&condition.kind, namespace).await {
            Ok(names) => names,
            Err(LookupError::UnsupportedKind(unsupported)) => {
                warn!(kind = %unsupported.0, "unsupported resource kind treated as no resources");
                Vec::new()
            }
            Err(lookup) => return Err(lookup.into()),
        };

        if names.is_empty() && condition.value == 0 && operator == EqualityOperator::Equals {
            return Ok(true);
        }

        let observed = match condition.target.as_deref().filter(|target| !target.is_empty()) {
            Some(filter) => names.iter().filter(|name| name_matches(filter, name)).count(),
            None => names.len(),
        } as u64;

        let satisfied = operator.compare(observed, condition.value);
        debug!(
            kind = %condition.kind,
            %namespace,
            observed,
            expected = condition.value,
            %operator,
            satisfied,
            "condition evaluated"
        );
        Ok(satisfied)
    }
}

fn parse_operator(condition: &ResourceCondition) -> Result<EqualityOperator, UnsupportedOperator> {
    condition.equality_operator.parse().inspect_err(|unsupported: &UnsupportedOperator| {
        error!(operator = %unsupported.0, kind = %condition.kind, "unsupported equality operator");
    })
}
