use crate::{
    cancel::CancelSignal,
    chain::{ChainClient, Confirmation, ConfirmationPolicy, ConfirmedReceipt, confirm},
    contracts::{
        IERC20, SenderLog, TransferUSDC::transferUsdcCall, TransferUSDCEvents, USDC_TRANSFERRED,
    },
    directory::{DeployedContracts, DeploymentStore},
    error::{ConfigError, DispatchError, SubmissionError},
    networks::NetworkRegistry,
    report::{MessageRecord, MessageReport},
    scenarios::{ScenarioSet, TransferParams},
};
use contender_core::alloy::{
    primitives::{Address, TxHash, U256},
    sol_types::SolCall,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A network that has a receiver, resolved against the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub network: String,
    pub receiver: Address,
    pub chain_selector: u64,
}

/// Sends every scenario to every destination from the source network's sender
/// contract, and pulls the CCIP message id out of each receipt.
///
/// Transactions go out strictly one at a time: the single signer's nonces must
/// stay ordered.
pub struct Dispatcher {
    source: String,
    registry: Arc<NetworkRegistry>,
    store: Arc<dyn DeploymentStore>,
    client: Arc<dyn ChainClient>,
    scenarios: ScenarioSet,
    policy: ConfirmationPolicy,
    approve_fee_token: bool,
    cancel: CancelSignal,
}

impl Dispatcher {
    pub fn new(
        source: impl Into<String>,
        registry: Arc<NetworkRegistry>,
        store: Arc<dyn DeploymentStore>,
        client: Arc<dyn ChainClient>,
        scenarios: ScenarioSet,
    ) -> Self {
        Self {
            source: source.into(),
            registry,
            store,
            client,
            scenarios,
            policy: ConfirmationPolicy::default(),
            approve_fee_token: true,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_fee_approval(mut self, approve: bool) -> Self {
        self.approve_fee_token = approve;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolves every network with a receiver. Fails on the first one that can't be
    /// a destination, before anything is sent.
    pub fn destinations(
        &self,
        contracts: &DeployedContracts,
    ) -> Result<Vec<Destination>, ConfigError> {
        contracts
            .receivers()
            .map(|(network, receiver)| -> Result<Destination, ConfigError> {
                let chain_selector = self
                    .registry
                    .resolve(network)?
                    .destination_selector(network)?;
                Ok(Destination {
                    network: network.to_owned(),
                    receiver,
                    chain_selector,
                })
            })
            .collect()
    }

    pub async fn run(&self) -> Result<MessageReport, DispatchError> {
        let source = self.source.as_str();
        let contracts = self.store.load().await?;
        if contracts.is_empty() {
            warn!(source, "deployment directory is empty, nothing is deployed yet");
        }
        let source_cfg = self.registry.resolve(source)?;
        let sender = contracts
            .sender_of(source)
            .ok_or_else(|| ConfigError::MissingSender(source.to_owned()))?;
        let destinations = self.destinations(&contracts)?;
        let signer = self.client.signer_address();
        info!(source, %sender, %signer, destinations = destinations.len(), "dispatching transfers");
        if destinations.len() < contracts.len() {
            debug!(
                skipped = contracts.len() - destinations.len(),
                "networks without a receiver are skipped"
            );
        }

        if self.approve_fee_token {
            self.approve(source_cfg.link_token, sender).await?;
        }
        match self.client.token_balance(source_cfg.usdc_token, signer).await {
            Ok(balance) => info!(%signer, %balance, token = %source_cfg.usdc_token, "usdc balance"),
            Err(e) => warn!(%signer, error = %e, "failed to read usdc balance"),
        }

        let mut report = MessageReport::default();
        for destination in &destinations {
            for params in self.scenarios.for_destination(&destination.network) {
                for record in self.transfer(sender, destination, params).await? {
                    report.push(record);
                }
            }
        }
        if report.is_empty() {
            warn!(source, "no messages were recorded");
        }
        info!(source, messages = report.len(), "dispatch finished");
        Ok(report)
    }

    /// Unlimited fee-token allowance for the sender contract.
    async fn approve(&self, token: Address, spender: Address) -> Result<(), DispatchError> {
        self.ensure_not_cancelled()?;
        info!(%token, %spender, allowance = %U256::MAX, "approving fee token");
        let calldata = IERC20::approveCall {
            spender,
            value: U256::MAX,
        }
        .abi_encode();
        let tx_hash = self
            .client
            .send_call(token, calldata.into())
            .await
            .map_err(SubmissionError::from)?;
        match self.wait(tx_hash).await? {
            Some(receipt) if receipt.success => info!(%tx_hash, "approved"),
            Some(_) => return Err(SubmissionError::Reverted(tx_hash).into()),
            None => warn!(%tx_hash, "approval not confirmed, transfers may fail to pay fees"),
        }
        Ok(())
    }

    async fn transfer(
        &self,
        sender: Address,
        destination: &Destination,
        params: &TransferParams,
    ) -> Result<Vec<MessageRecord>, DispatchError> {
        self.ensure_not_cancelled()?;
        let call = transferUsdcCall {
            _destinationChainSelector: destination.chain_selector,
            _receiver: destination.receiver,
            _iterations: U256::from(params.iterations),
            _amount: U256::from(params.amount),
            _gasLimit: params.gas_limit,
        };
        let tx_hash = self
            .client
            .send_call(sender, call.abi_encode().into())
            .await
            .map_err(SubmissionError::from)?;
        info!(
            destination = %destination.network,
            %tx_hash,
            iterations = params.iterations,
            amount = params.amount,
            gas_limit = params.gas_limit,
            "transfer submitted"
        );

        let Some(receipt) = self.wait(tx_hash).await? else {
            warn!(destination = %destination.network, %tx_hash, "no receipt, no message recorded");
            return Ok(vec![]);
        };
        if !receipt.success {
            return Err(SubmissionError::Reverted(tx_hash).into());
        }

        let records = message_records(&receipt, &destination.network, params);
        match records.len() {
            0 => warn!(%tx_hash, "receipt has no {USDC_TRANSFERRED} event"),
            1 => {}
            n => warn!(
                %tx_hash,
                events = n,
                "receipt has several {USDC_TRANSFERRED} events, recording all"
            ),
        }
        Ok(records)
    }

    /// Nothing new goes on-chain once cancelled.
    fn ensure_not_cancelled(&self) -> Result<(), DispatchError> {
        if self.cancel.is_cancelled() {
            warn!(source = %self.source, "cancelled, not sending further transactions");
            return Err(DispatchError::Interrupted);
        }
        Ok(())
    }

    async fn wait(&self, tx_hash: TxHash) -> Result<Option<ConfirmedReceipt>, DispatchError> {
        match confirm(self.client.as_ref(), tx_hash, self.policy, &self.cancel).await? {
            Confirmation::Mined(receipt) => Ok(Some(receipt)),
            Confirmation::Missing => Ok(None),
            Confirmation::Cancelled => {
                warn!(%tx_hash, "cancelled, transaction remains in flight");
                Err(DispatchError::Cancelled(tx_hash))
            }
        }
    }
}

/// One record per `UsdcTransferred` log, in log order. Everything else is ignored.
pub fn message_records(
    receipt: &ConfirmedReceipt,
    destination: &str,
    params: &TransferParams,
) -> Vec<MessageRecord> {
    receipt
        .logs
        .iter()
        .filter_map(|log| match SenderLog::decode(log) {
            SenderLog::Decoded {
                name,
                event: TransferUSDCEvents::UsdcTransferred(event),
            } if name == USDC_TRANSFERRED => Some(MessageRecord {
                destination: destination.to_owned(),
                iterations: params.iterations,
                gas_limit: params.gas_limit,
                message_id: event.messageId,
                tx_hash: receipt.tx_hash,
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::tests::{FakeChain, Outcome, SentTx},
        contracts::{
            TransferUSDC,
            tests::{rpc_log, usdc_transferred},
        },
        directory::{ContractRole, MemoryStore},
        networks::tests::network,
        scenarios::{CALIBRATION, PROD},
    };
    use contender_core::alloy::{primitives::B256, rpc::types::Log};
    use std::time::Duration;

    const SENDER: Address = Address::new([0xa0; 20]);

    fn receiver(n: u8) -> Address {
        Address::repeat_byte(0xb0 + n)
    }

    struct Setup {
        registry: NetworkRegistry,
        contracts: DeployedContracts,
        scenarios: ScenarioSet,
    }

    impl Setup {
        /// Source network `src` with a sender and no receiver.
        fn new() -> Self {
            let mut contracts = DeployedContracts::default();
            contracts.record("src", ContractRole::Sender, SENDER);
            Self {
                registry: NetworkRegistry::from_iter([("src".to_owned(), network(Some(1)))]),
                contracts,
                scenarios: ScenarioSet::prod(),
            }
        }

        fn destination(
            mut self,
            name: &str,
            selector: Option<u64>,
            receiver: Option<Address>,
        ) -> Self {
            let mut networks: Vec<_> = self
                .registry
                .names()
                .map(|n| (n.to_owned(), self.registry.resolve(n).unwrap().clone()))
                .collect();
            networks.push((name.to_owned(), network(selector)));
            self.registry = networks.into_iter().collect();
            match receiver {
                Some(r) => {
                    self.contracts.record(name, ContractRole::Receiver, r);
                }
                None => {
                    self.contracts
                        .record(name, ContractRole::Swapper, Address::repeat_byte(0x55));
                }
            }
            self
        }

        fn dispatcher(self, chain: &Arc<FakeChain>) -> Dispatcher {
            Dispatcher::new(
                "src",
                Arc::new(self.registry),
                Arc::new(MemoryStore::new(self.contracts)),
                chain.clone(),
                self.scenarios,
            )
            .with_fee_approval(false)
            .with_policy(ConfirmationPolicy {
                confirmations: 5,
                timeout: Duration::from_millis(50),
            })
        }
    }

    fn receipt(logs: Vec<Log>) -> ConfirmedReceipt {
        ConfirmedReceipt {
            tx_hash: TxHash::repeat_byte(1),
            success: true,
            contract_address: None,
            logs,
        }
    }

    #[tokio::test]
    async fn single_destination_single_scenario() {
        let chain = Arc::new(FakeChain::new());
        let dispatcher = Setup::new()
            .destination("a", Some(12345), Some(receiver(1)))
            .dispatcher(&chain);

        let report = dispatcher.run().await.unwrap();

        let transfers = chain.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0]._destinationChainSelector, 12345);
        assert_eq!(transfers[0]._receiver, receiver(1));
        assert_eq!(transfers[0]._iterations, U256::ZERO);
        assert_eq!(transfers[0]._amount, U256::from(1_000_000u64));
        assert_eq!(transfers[0]._gasLimit, 180_970);
        assert!(matches!(&chain.sent()[0], SentTx::Call { to, .. } if *to == SENDER));
        assert_eq!(chain.waits()[0].1, 5);

        // the fake receipt carries a foreign ERC-20 log before the sender's event
        let records = report.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].iterations, 0);
        assert_eq!(records[0].gas_limit, 180_970);
        assert_eq!(records[0].destination, "a");
        assert_ne!(records[0].message_id, B256::ZERO);
    }

    #[tokio::test]
    async fn networks_without_receiver_get_nothing() {
        let chain = Arc::new(FakeChain::new());
        let dispatcher = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .destination("b", Some(22), None)
            .dispatcher(&chain);

        let report = dispatcher.run().await.unwrap();
        let selectors: Vec<_> = chain
            .transfers()
            .iter()
            .map(|t| t._destinationChainSelector)
            .collect();
        assert_eq!(selectors, vec![11]);
        assert_eq!(report.len(), 1);
    }

    #[tokio::test]
    async fn two_destinations_keep_network_order() {
        let chain = Arc::new(FakeChain::new());
        let dispatcher = Setup::new()
            .destination("beta", Some(22), Some(receiver(2)))
            .destination("alpha", Some(11), Some(receiver(1)))
            .dispatcher(&chain);

        let report = dispatcher.run().await.unwrap();
        let destinations: Vec<_> = report
            .records()
            .iter()
            .map(|r| r.destination.as_str())
            .collect();
        assert_eq!(destinations, vec!["alpha", "beta"]);
        assert_ne!(report.records()[0].tx_hash, report.records()[1].tx_hash);
        assert_ne!(report.records()[0].message_id, report.records()[1].message_id);
        assert_eq!(chain.transfers().len(), 2);
    }

    #[tokio::test]
    async fn missing_chain_selector_sends_nothing() {
        let chain = Arc::new(FakeChain::new());
        let dispatcher = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .destination("b", None, Some(receiver(2)))
            .dispatcher(&chain);

        let err = dispatcher.run().await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Config(ConfigError::MissingChainSelector(ref n)) if n == "b"
        ));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn receiver_without_network_config_is_fatal() {
        let chain = Arc::new(FakeChain::new());
        let mut setup = Setup::new();
        setup.contracts.record("ghost", ContractRole::Receiver, receiver(9));
        let err = setup.dispatcher(&chain).run().await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Config(ConfigError::NetworkNotFound(ref n)) if n == "ghost"
        ));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn source_without_sender_is_fatal() {
        let chain = Arc::new(FakeChain::new());
        let mut setup = Setup::new().destination("a", Some(11), Some(receiver(1)));
        setup.contracts = DeployedContracts::default();
        setup.contracts.record("a", ContractRole::Receiver, receiver(1));
        let err = setup.dispatcher(&chain).run().await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Config(ConfigError::MissingSender(_))
        ));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn rerun_sends_new_transactions() {
        let chain = Arc::new(FakeChain::new());
        let setup = || Setup::new().destination("a", Some(11), Some(receiver(1)));

        let first = setup().dispatcher(&chain).run().await.unwrap();
        let second = setup().dispatcher(&chain).run().await.unwrap();

        assert_eq!(chain.transfers().len(), 2);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first.records()[0].tx_hash, second.records()[0].tx_hash);
        assert_ne!(first.records()[0].message_id, second.records()[0].message_id);
    }

    #[tokio::test]
    async fn missing_receipt_moves_to_next_scenario() {
        let chain = Arc::new(FakeChain::new());
        let mut setup = Setup::new().destination("a", Some(11), Some(receiver(1)));
        setup.scenarios = ScenarioSet::calibration();
        chain.script(Outcome::NoReceipt);
        chain.script(Outcome::Hang);

        let report = setup.dispatcher(&chain).run().await.unwrap();
        assert_eq!(chain.transfers().len(), 3);
        assert_eq!(report.len(), 1);
        assert_eq!(report.records()[0].iterations, CALIBRATION[2].iterations);
        assert_eq!(report.records()[0].gas_limit, CALIBRATION[2].gas_limit);
    }

    #[tokio::test]
    async fn receipt_without_transfer_event_yields_nothing() {
        let chain = Arc::new(FakeChain::new());
        let ownership = TransferUSDC::OwnershipTransferred {
            from: Address::ZERO,
            to: Address::repeat_byte(1),
        };
        chain.script(Outcome::Logs(vec![
            Log::default(),
            rpc_log(SENDER, &ownership),
        ]));
        let report = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .dispatcher(&chain)
            .run()
            .await
            .unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn duplicate_events_are_all_recorded() {
        let chain = Arc::new(FakeChain::new());
        let id = B256::repeat_byte(0x42);
        chain.script(Outcome::Logs(vec![
            rpc_log(SENDER, &usdc_transferred(id)),
            rpc_log(SENDER, &usdc_transferred(id)),
        ]));
        let report = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .dispatcher(&chain)
            .run()
            .await
            .unwrap();
        assert_eq!(report.len(), 2);
        assert!(report.records().iter().all(|r| r.message_id == id));
    }

    #[tokio::test]
    async fn reverted_transfer_stops_the_run() {
        let chain = Arc::new(FakeChain::new());
        chain.script(Outcome::Reverted);
        let err = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .destination("b", Some(22), Some(receiver(2)))
            .dispatcher(&chain)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Submission(SubmissionError::Reverted(_))
        ));
        assert_eq!(chain.transfers().len(), 1);
    }

    #[tokio::test]
    async fn rejected_transfer_stops_the_run() {
        let chain = Arc::new(FakeChain::new());
        chain.script(Outcome::Reject);
        let err = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .destination("b", Some(22), Some(receiver(2)))
            .dispatcher(&chain)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Submission(SubmissionError::Rejected(_))
        ));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait() {
        let chain = Arc::new(FakeChain::new());
        chain.script(Outcome::Hang);
        let (handle, signal) = crate::cancel::cancel_pair();
        let dispatcher = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .destination("b", Some(22), Some(receiver(2)))
            .dispatcher(&chain)
            .with_policy(ConfirmationPolicy::default())
            .with_cancel(signal);

        let interrupt = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });
        let err = dispatcher.run().await.unwrap_err();
        interrupt.await.unwrap();

        let DispatchError::Cancelled(hash) = err else {
            panic!("expected a cancelled wait, got {err:?}");
        };
        assert_eq!(chain.waits(), vec![(hash, 5)]);
        assert_eq!(chain.transfers().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_run_sends_nothing() {
        let chain = Arc::new(FakeChain::new());
        let (handle, signal) = crate::cancel::cancel_pair();
        handle.cancel();
        let err = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .dispatcher(&chain)
            .with_fee_approval(true)
            .with_cancel(signal)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Interrupted));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn cancel_between_transfers_stops_before_the_next_one() {
        let chain = Arc::new(FakeChain::new());
        let (handle, signal) = crate::cancel::cancel_pair();
        let mut setup = Setup::new().destination("a", Some(11), Some(receiver(1)));
        setup.scenarios = ScenarioSet::calibration();
        let dispatcher = setup.dispatcher(&chain).with_cancel(signal);

        let contracts = dispatcher.store.load().await.unwrap();
        let destinations = dispatcher.destinations(&contracts).unwrap();
        let destination = &destinations[0];

        let first = dispatcher
            .transfer(SENDER, destination, &CALIBRATION[0])
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        handle.cancel();
        let err = dispatcher
            .transfer(SENDER, destination, &CALIBRATION[1])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Interrupted));
        assert_eq!(chain.transfers().len(), 1);
    }

    #[tokio::test]
    async fn approves_fee_token_before_transfers() {
        let chain = Arc::new(FakeChain::new());
        let report = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .dispatcher(&chain)
            .with_fee_approval(true)
            .run()
            .await
            .unwrap();
        assert_eq!(report.len(), 1);

        let sent = chain.sent();
        assert_eq!(sent.len(), 2);
        let SentTx::Call { to, input } = &sent[0] else {
            panic!("expected approval call");
        };
        assert_eq!(*to, network(None).link_token);
        let approval = IERC20::approveCall::abi_decode(input).unwrap();
        assert_eq!(approval.spender, SENDER);
        assert_eq!(approval.value, U256::MAX);
        assert!(sent[1].transfer().is_some());
    }

    #[tokio::test]
    async fn destination_overrides_change_gas_limit() {
        let chain = Arc::new(FakeChain::new());
        let mut setup = Setup::new()
            .destination("a", Some(11), Some(receiver(1)))
            .destination("b", Some(22), Some(receiver(2)));
        setup
            .scenarios
            .overrides
            .insert("b".into(), vec![TransferParams::new(3, 7, 250_000)]);
        setup.dispatcher(&chain).run().await.unwrap();

        let gas: Vec<_> = chain.transfers().iter().map(|t| t._gasLimit).collect();
        assert_eq!(gas, vec![PROD[0].gas_limit, 250_000]);
    }

    #[test]
    fn correlation_skips_foreign_logs() {
        let foreign = IERC20::Transfer {
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            value: U256::from(5u64),
        };
        let id = B256::repeat_byte(9);
        let receipt = receipt(vec![
            rpc_log(Address::repeat_byte(0x12), &foreign),
            rpc_log(SENDER, &usdc_transferred(id)),
        ]);
        let records = message_records(&receipt, "a", &PROD[0]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, id);
        assert_eq!(records[0].tx_hash, receipt.tx_hash);
    }

    #[test]
    fn correlation_of_empty_receipt_is_empty() {
        assert!(message_records(&receipt(vec![]), "a", &PROD[0]).is_empty());
    }
}
