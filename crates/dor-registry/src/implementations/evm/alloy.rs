//! Alloy-based registry client.
//!
//! Reads go through `eth_call` against the registry contract; updates are
//! signed locally by the configured updater key and broadcast over HTTP.

use crate::{RateUpdate, RegistryError, RegistryInterface, SourceInfo, UpdateReceipt};
use ::alloy::network::{EthereumWallet, TransactionBuilder};
use ::alloy::primitives::{Address, TxHash, U256};
use ::alloy::providers::{DynProvider, Provider, ProviderBuilder};
use ::alloy::rpc::types::TransactionRequest;
use ::alloy::signers::local::PrivateKeySigner;
use ::alloy::signers::Signer;
use ::alloy::sol;
use ::alloy::sol_types::SolCall;
use ::alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use dor_types::{RegistryConfig, SourceId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

sol! {
	/// Rate registry contract.
	interface IDorRegistry {
		function getCurrentDOR() external view returns (uint256);
		function getSourceInfo(uint8 sourceId) external view returns (uint256 weight, uint256 rate, uint256 lastUpdate);
		function isUpdater(address account) external view returns (bool);
		function batchUpdateRates(uint8[] calldata sourceIds, uint256[] calldata newRates) external;
	}
}

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

fn truncate_hash(hash: &str) -> &str {
	hash.get(..10).unwrap_or(hash)
}

fn to_i64(value: U256, what: &str) -> Result<i64, RegistryError> {
	u64::try_from(value)
		.ok()
		.and_then(|v| i64::try_from(v).ok())
		.ok_or_else(|| RegistryError::Decode(format!("{} out of range: {}", what, value)))
}

fn to_u64(value: U256, what: &str) -> Result<u64, RegistryError> {
	u64::try_from(value)
		.map_err(|_| RegistryError::Decode(format!("{} out of range: {}", what, value)))
}

/// Registry client backed by an Alloy HTTP provider with a local signer.
pub struct AlloyRegistry {
	provider: DynProvider,
	contract: Address,
	signer_address: Address,
}

impl AlloyRegistry {
	pub fn new(
		rpc_url: &str,
		chain_id: u64,
		contract_address: &str,
		private_key: &str,
	) -> Result<Self, RegistryError> {
		let url = Url::parse(rpc_url)
			.map_err(|e| RegistryError::InvalidConfig(format!("Invalid RPC URL: {}", e)))?;

		let contract = contract_address
			.parse::<Address>()
			.map_err(|e| RegistryError::InvalidConfig(format!("Invalid contract address: {}", e)))?;

		let signer = private_key
			.parse::<PrivateKeySigner>()
			.map_err(|e| RegistryError::InvalidConfig(format!("Invalid private key: {}", e)))?
			.with_chain_id(Some(chain_id));
		let signer_address = signer.address();

		let provider = ProviderBuilder::new()
			.wallet(EthereumWallet::from(signer))
			.connect_http(url)
			.erased();

		info!(
			contract = %contract,
			updater = %signer_address,
			chain_id,
			"Registry client ready"
		);

		Ok(Self {
			provider,
			contract,
			signer_address,
		})
	}

	pub fn signer_address(&self) -> Address {
		self.signer_address
	}

	fn request(&self, input: Vec<u8>) -> TransactionRequest {
		TransactionRequest::default()
			.with_from(self.signer_address)
			.with_to(self.contract)
			.with_input(input)
	}

	async fn call<C>(&self, call: C) -> Result<C::Return, RegistryError>
	where
		C: SolCall + Send,
	{
		let output = self
			.provider
			.call(self.request(call.abi_encode()))
			.await
			.map_err(|e| RegistryError::Network(format!("{} failed: {}", C::SIGNATURE, e)))?;

		C::abi_decode_returns(&output)
			.map_err(|e| RegistryError::Decode(format!("{}: {}", C::SIGNATURE, e)))
	}

	fn update_request(update: &RateUpdate) -> Vec<u8> {
		IDorRegistry::batchUpdateRatesCall {
			sourceIds: update.source_ids.clone(),
			newRates: update.rates.iter().map(|r| U256::from(*r)).collect(),
		}
		.abi_encode()
	}

	async fn poll_receipt(&self, hash: TxHash) -> Result<UpdateReceipt, RegistryError> {
		loop {
			let receipt = self
				.provider
				.get_transaction_receipt(hash)
				.await
				.map_err(|e| RegistryError::Network(format!("Failed to get receipt: {}", e)))?;

			match receipt {
				Some(receipt) => {
					return Ok(UpdateReceipt {
						tx_hash: receipt.transaction_hash.to_string(),
						block_number: receipt.block_number.unwrap_or(0),
						gas_used: receipt.gas_used,
						success: receipt.status(),
					})
				}
				None => {
					debug!(tx_hash = %hash, "Transaction not yet mined");
					tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
				}
			}
		}
	}
}

#[async_trait]
impl RegistryInterface for AlloyRegistry {
	async fn current_rate(&self) -> Result<i64, RegistryError> {
		let value = self.call(IDorRegistry::getCurrentDORCall {}).await?;
		to_i64(value, "current rate")
	}

	async fn source_info(&self, source: SourceId) -> Result<SourceInfo, RegistryError> {
		let info = self
			.call(IDorRegistry::getSourceInfoCall {
				sourceId: source.index(),
			})
			.await?;

		Ok(SourceInfo {
			source_id: source,
			weight_bps: to_i64(info.weight, "weight")?,
			rate_bps: to_i64(info.rate, "rate")?,
			last_update: to_u64(info.lastUpdate, "last update")?,
		})
	}

	async fn is_authorized(&self) -> Result<bool, RegistryError> {
		self.call(IDorRegistry::isUpdaterCall {
			account: self.signer_address,
		})
		.await
	}

	async fn estimate_update_gas(&self, update: &RateUpdate) -> Result<u64, RegistryError> {
		self.provider
			.estimate_gas(self.request(Self::update_request(update)))
			.await
			.map_err(|e| RegistryError::Network(format!("Gas estimation failed: {}", e)))
	}

	async fn gas_price(&self) -> Result<u128, RegistryError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| RegistryError::Network(format!("Failed to get gas price: {}", e)))
	}

	async fn submit_update(&self, update: &RateUpdate) -> Result<String, RegistryError> {
		let pending = self
			.provider
			.send_transaction(self.request(Self::update_request(update)))
			.await
			.map_err(|e| RegistryError::Network(format!("Failed to send transaction: {}", e)))?;

		let tx_hash = pending.tx_hash().to_string();
		info!(
			tx_hash = %truncate_hash(&tx_hash),
			sources = update.len(),
			"Submitted rate update"
		);
		Ok(tx_hash)
	}

	async fn wait_for_confirmation(
		&self,
		tx_hash: &str,
		timeout: Duration,
	) -> Result<UpdateReceipt, RegistryError> {
		let hash = tx_hash
			.parse::<TxHash>()
			.map_err(|e| RegistryError::Decode(format!("Invalid transaction hash: {}", e)))?;

		info!(
			tx_hash = %truncate_hash(tx_hash),
			"Waiting for confirmation (timeout: {}s)",
			timeout.as_secs()
		);

		tokio::time::timeout(timeout, self.poll_receipt(hash))
			.await
			.map_err(|_| RegistryError::Timeout(timeout))?
	}
}

/// Builds the registry client from configuration.
pub fn create_registry(
	config: &RegistryConfig,
) -> Result<Arc<dyn RegistryInterface>, RegistryError> {
	let registry = AlloyRegistry::new(
		&config.rpc_url,
		config.chain_id,
		&config.contract_address,
		&config.private_key,
	)?;
	Ok(Arc::new(registry))
}
