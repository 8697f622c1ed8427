//! Actor-based serialization of network operations
//!
//! One tokio task owns the [`CurrencyNetwork`]; every caller talks to it
//! through a cloneable [`LedgerHandle`]. Operations therefore execute one at
//! a time, which is the serializing substrate the ledger relies on.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Callers (server, exchange, tests)            │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox               │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │     owns CurrencyNetwork, replies over oneshot        │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{
    cheque::Cheque,
    ledger::LimitUpdate,
    network::CurrencyNetwork,
    transfer::{PreparedTransfer, TransferReceipt},
    types::{Address, TrustlineView},
    Error, Result,
};
use tokio::sync::{mpsc, oneshot};

/// Closure run against the network inside the actor
pub type NetworkJob = Box<dyn FnOnce(&mut CurrencyNetwork) + Send>;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Propose a credit limit
    ProposeLimit {
        /// Account extending the limit
        caller: Address,
        /// Account receiving the limit
        counterpart: Address,
        /// Proposed limit
        limit: u64,
        /// Reply channel
        response: oneshot::Sender<Result<LimitUpdate>>,
    },

    /// Accept a proposed credit limit
    AcceptLimit {
        /// Account receiving the limit
        caller: Address,
        /// Account that proposed it
        counterpart: Address,
        /// Limit being accepted
        limit: u64,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Read a trustline
    Trustline {
        /// Viewing account
        a: Address,
        /// Counterparty
        b: Address,
        /// Reply channel
        response: oneshot::Sender<Result<TrustlineView>>,
    },

    /// Read a net balance
    BalanceOf {
        /// Account to sum over
        account: Address,
        /// Reply channel
        response: oneshot::Sender<i64>,
    },

    /// Prepare a transfer
    Prepare {
        /// Paying account
        caller: Address,
        /// Receiving account
        receiver: Address,
        /// Amount the receiver gets
        value: u64,
        /// Fee cap
        max_fee: u64,
        /// Hops after the caller, ending at the receiver
        path: Vec<Address>,
        /// Reply channel
        response: oneshot::Sender<Result<PreparedTransfer>>,
    },

    /// Commit a prepared transfer
    Transfer {
        /// Paying account
        caller: Address,
        /// Receiving account
        receiver: Address,
        /// Prepared amount
        value: u64,
        /// Reply channel
        response: oneshot::Sender<Result<TransferReceipt>>,
    },

    /// Cash a cheque
    RedeemCheque {
        /// Signed cheque
        cheque: Cheque,
        /// Reply channel
        response: oneshot::Sender<Result<TransferReceipt>>,
    },

    /// Run an arbitrary closure with exclusive access
    Execute(NetworkJob),

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Owned network state
    network: CurrencyNetwork,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(network: CurrencyNetwork, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self { network, mailbox }
    }

    /// Run the actor event loop; returns the network once the mailbox closes
    pub async fn run(mut self) -> CurrencyNetwork {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                tracing::info!("Ledger actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
        self.network
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        let network = &mut self.network;
        match msg {
            LedgerMessage::ProposeLimit {
                caller,
                counterpart,
                limit,
                response,
            } => {
                let _ = response.send(network.propose_limit(caller, counterpart, limit));
            }

            LedgerMessage::AcceptLimit {
                caller,
                counterpart,
                limit,
                response,
            } => {
                let _ = response.send(network.accept_limit(caller, counterpart, limit));
            }

            LedgerMessage::Trustline { a, b, response } => {
                let _ = response.send(network.trustline(a, b));
            }

            LedgerMessage::BalanceOf { account, response } => {
                let _ = response.send(network.balance_of(account));
            }

            LedgerMessage::Prepare {
                caller,
                receiver,
                value,
                max_fee,
                path,
                response,
            } => {
                let _ = response.send(network.prepare(caller, receiver, value, max_fee, path));
            }

            LedgerMessage::Transfer {
                caller,
                receiver,
                value,
                response,
            } => {
                let _ = response.send(network.transfer(caller, receiver, value));
            }

            LedgerMessage::RedeemCheque { cheque, response } => {
                let _ = response.send(network.redeem_cheque(&cheque));
            }

            LedgerMessage::Execute(job) => job(network),

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Propose a credit limit
    pub async fn propose_limit(
        &self,
        caller: Address,
        counterpart: Address,
        limit: u64,
    ) -> Result<LimitUpdate> {
        self.request(|response| LedgerMessage::ProposeLimit {
            caller,
            counterpart,
            limit,
            response,
        })
        .await?
    }

    /// Accept a proposed credit limit
    pub async fn accept_limit(&self, caller: Address, counterpart: Address, limit: u64) -> Result<()> {
        self.request(|response| LedgerMessage::AcceptLimit {
            caller,
            counterpart,
            limit,
            response,
        })
        .await?
    }

    /// Read a trustline
    pub async fn trustline(&self, a: Address, b: Address) -> Result<TrustlineView> {
        self.request(|response| LedgerMessage::Trustline { a, b, response })
            .await?
    }

    /// Read a net balance
    pub async fn balance_of(&self, account: Address) -> Result<i64> {
        self.request(|response| LedgerMessage::BalanceOf { account, response })
            .await
    }

    /// Prepare a transfer
    pub async fn prepare(
        &self,
        caller: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: Vec<Address>,
    ) -> Result<PreparedTransfer> {
        self.request(|response| LedgerMessage::Prepare {
            caller,
            receiver,
            value,
            max_fee,
            path,
            response,
        })
        .await?
    }

    /// Commit a prepared transfer
    pub async fn transfer(
        &self,
        caller: Address,
        receiver: Address,
        value: u64,
    ) -> Result<TransferReceipt> {
        self.request(|response| LedgerMessage::Transfer {
            caller,
            receiver,
            value,
            response,
        })
        .await?
    }

    /// Cash a cheque
    pub async fn redeem_cheque(&self, cheque: Cheque) -> Result<TransferReceipt> {
        self.request(|response| LedgerMessage::RedeemCheque { cheque, response })
            .await?
    }

    /// Run `job` with exclusive access to the network and return its result
    pub async fn execute<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CurrencyNetwork) -> T + Send + 'static,
    {
        self.request(|response| {
            LedgerMessage::Execute(Box::new(move |network: &mut CurrencyNetwork| {
                let _ = response.send(job(network));
            }))
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor with a mailbox sized by the network's config
pub fn spawn_ledger_actor(
    network: CurrencyNetwork,
) -> (LedgerHandle, tokio::task::JoinHandle<CurrencyNetwork>) {
    let (tx, rx) = mpsc::channel(network.config().actor.mailbox_capacity);
    let actor = LedgerActor::new(network, rx);
    let task = tokio::spawn(actor.run());
    (LedgerHandle::new(tx), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    async fn open(handle: &LedgerHandle, a: Address, b: Address, limit: u64) {
        handle.propose_limit(a, b, limit).await.unwrap();
        handle.accept_limit(b, a, limit).await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_transfer() {
        let network = CurrencyNetwork::new(Config::default()).unwrap();
        let (handle, _task) = spawn_ledger_actor(network);

        open(&handle, addr(2), addr(1), 100).await;
        handle
            .prepare(addr(1), addr(2), 60, 0, vec![addr(2)])
            .await
            .unwrap();
        let receipt = handle.transfer(addr(1), addr(2), 60).await.unwrap();
        assert_eq!(receipt.value, 60);

        assert_eq!(handle.balance_of(addr(2)).await.unwrap(), 60);
        let view = handle.trustline(addr(1), addr(2)).await.unwrap();
        assert_eq!(<(u64, u64, i64)>::from(view), (0, 100, -60));
    }

    #[tokio::test]
    async fn test_actor_propagates_errors() {
        let network = CurrencyNetwork::new(Config::default()).unwrap();
        let (handle, _task) = spawn_ledger_actor(network);
        assert!(matches!(
            handle.propose_limit(addr(1), addr(1), 10).await,
            Err(Error::SelfTrust(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_is_serialized() {
        let network = CurrencyNetwork::new(Config::default()).unwrap();
        let (handle, _task) = spawn_ledger_actor(network);
        open(&handle, addr(2), addr(1), 1_000).await;

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .execute(|network| {
                        network.mediated_transfer(addr(1), addr(2), 10, 0, &[addr(2)])
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap().unwrap();
        }
        assert_eq!(handle.balance_of(addr(2)).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_shutdown_returns_network() {
        let network = CurrencyNetwork::new(Config::default()).unwrap();
        let (handle, task) = spawn_ledger_actor(network);
        open(&handle, addr(1), addr(2), 5).await;
        handle.shutdown().await.unwrap();

        let network = task.await.unwrap();
        assert_eq!(network.total_supply(), 5);
        assert!(matches!(
            handle.balance_of(addr(1)).await,
            Err(Error::Concurrency(_))
        ));
    }
}
