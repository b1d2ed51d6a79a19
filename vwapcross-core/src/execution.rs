//! Execution interface consumed by the engine.
//!
//! The core only looks at ack vs. error. Retries and timeouts belong to the
//! client; concurrent timeframe workers share one client through
//! [`SharedExecution`], which serialises submissions.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::OrderSide;
use crate::order::OrderIntent;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("execution venue unavailable: {0}")]
    Unavailable(String),
}

/// Acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub fill_price: f64,
    pub timestamp: DateTime<Utc>,
}

pub trait ExecutionClient: Send {
    fn submit_order(&mut self, intent: &OrderIntent) -> Result<OrderAck, ExecutionError>;
}

impl<E: ExecutionClient + ?Sized> ExecutionClient for Box<E> {
    fn submit_order(&mut self, intent: &OrderIntent) -> Result<OrderAck, ExecutionError> {
        (**self).submit_order(intent)
    }
}

impl<E: ExecutionClient + ?Sized> ExecutionClient for &mut E {
    fn submit_order(&mut self, intent: &OrderIntent) -> Result<OrderAck, ExecutionError> {
        (**self).submit_order(intent)
    }
}

/// A fill recorded by [`SimulatedExecution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedFill {
    pub intent: OrderIntent,
    pub ack: OrderAck,
}

/// Fixed fill model: every order fills in full at its price basis.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecution {
    next_order_id: u64,
    fills: Vec<SimulatedFill>,
    fill_limit: Option<usize>,
}

impl SimulatedExecution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain only the newest `limit` fills. Order ids keep counting.
    pub fn with_fill_limit(limit: usize) -> Self {
        Self {
            fill_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn fills(&self) -> &[SimulatedFill] {
        &self.fills
    }

    pub fn into_fills(self) -> Vec<SimulatedFill> {
        self.fills
    }
}

impl ExecutionClient for SimulatedExecution {
    fn submit_order(&mut self, intent: &OrderIntent) -> Result<OrderAck, ExecutionError> {
        if !(intent.size.is_finite() && intent.size > 0.0) {
            return Err(ExecutionError::Rejected(format!(
                "invalid size {}",
                intent.size
            )));
        }
        self.next_order_id += 1;
        let ack = OrderAck {
            order_id: self.next_order_id,
            symbol: intent.symbol.clone(),
            side: intent.side,
            size: intent.size,
            fill_price: intent.price_basis,
            timestamp: intent.timestamp,
        };
        self.fills.push(SimulatedFill {
            intent: intent.clone(),
            ack: ack.clone(),
        });
        if let Some(limit) = self.fill_limit {
            if self.fills.len() > limit {
                let excess = self.fills.len() - limit;
                self.fills.drain(..excess);
            }
        }
        Ok(ack)
    }
}

/// Cloneable handle that serialises submissions to one underlying client.
#[derive(Debug)]
pub struct SharedExecution<E> {
    inner: Arc<Mutex<E>>,
}

impl<E> Clone for SharedExecution<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: ExecutionClient> SharedExecution<E> {
    pub fn new(client: E) -> Self {
        Self {
            inner: Arc::new(Mutex::new(client)),
        }
    }

    /// Run `f` against the wrapped client while holding the lock.
    pub fn with_client<R>(&self, f: impl FnOnce(&E) -> R) -> Result<R, ExecutionError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| ExecutionError::Unavailable("execution client lock poisoned".into()))?;
        Ok(f(&guard))
    }
}

impl<E: ExecutionClient> ExecutionClient for SharedExecution<E> {
    fn submit_order(&mut self, intent: &OrderIntent) -> Result<OrderAck, ExecutionError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ExecutionError::Unavailable("execution client lock poisoned".into()))?;
        guard.submit_order(intent)
    }
}
