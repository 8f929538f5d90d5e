//! Side-effect-free queries against the registry and the payment token.

use crate::abi::{IMachineManager, IMachineManagerTuple, IERC20};
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use futures::stream::{self, StreamExt};
use machina_core::{
    ChainReadEffects, IdFallback, MachinaConfig, MachinaError, MachinaResult, Machine,
    MachineEncoding, MachineIndex, TokenAmount,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Upper bound on in-flight `getMachine` calls while listing.
const LISTING_CONCURRENCY: usize = 8;

/// Listings larger than this are refused rather than read one by one.
pub const MAX_LISTED_MACHINES: u64 = 10_000;

/// Reads machine records, usage flags and balances.
///
/// Every value is fetched from the chain on each call.
#[derive(Clone)]
pub struct ContractReader {
    chain: Arc<dyn ChainReadEffects>,
    registry: Address,
    payment_token: Option<Address>,
    encoding: MachineEncoding,
    first_machine_id: u64,
    id_fallback: IdFallback,
}

impl std::fmt::Debug for ContractReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractReader")
            .field("registry", &self.registry)
            .field("payment_token", &self.payment_token)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl ContractReader {
    pub fn new(chain: Arc<dyn ChainReadEffects>, config: &MachinaConfig) -> MachinaResult<Self> {
        Ok(Self {
            chain,
            registry: config.machine_manager()?,
            payment_token: config.contracts.payment_token,
            encoding: config.contracts.machine_encoding,
            first_machine_id: config.contracts.first_machine_id,
            id_fallback: config.payment.id_fallback,
        })
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    /// Map an app-level machine id to a registry index under the configured
    /// fallback policy.
    pub fn convert_machine_id(&self, id: &str) -> MachinaResult<MachineIndex> {
        MachineIndex::parse(id, self.id_fallback)
    }

    pub async fn get_machine(&self, index: MachineIndex) -> MachinaResult<Machine> {
        let machine_id = index.as_u256();
        let machine = match self.encoding {
            MachineEncoding::Struct => {
                let info = self
                    .query(self.registry, IMachineManager::getMachineCall { machineId: machine_id })
                    .await?
                    .info;
                Machine {
                    index,
                    name: info.name,
                    machine_addr: info.machineAddr,
                    price: TokenAmount::from_base_units(info.price),
                    platform_fee_bps: info.platformFeeBps,
                    exists: info.exists,
                }
            }
            MachineEncoding::Tuple => {
                let ret = self
                    .query(
                        self.registry,
                        IMachineManagerTuple::getMachineCall { machineId: machine_id },
                    )
                    .await?;
                Machine {
                    index,
                    name: ret.name,
                    machine_addr: ret.machineAddr,
                    price: TokenAmount::from_base_units(ret.price),
                    platform_fee_bps: ret.platformFeeBps,
                    exists: ret.exists,
                }
            }
        };
        debug!(machine = %index, price = %machine.price, exists = machine.exists, "read machine");
        Ok(machine)
    }

    /// One past the highest registered index.
    pub async fn machine_count(&self) -> MachinaResult<U256> {
        Ok(self
            .query(self.registry, IMachineManager::nextMachineIdCall {})
            .await?
            .nextId)
    }

    /// Every registered machine in index order.
    ///
    /// An entry that cannot be read is replaced by [`Machine::placeholder`];
    /// only a failure to read the machine count fails the listing.
    pub async fn get_all_machines(&self) -> MachinaResult<Vec<Machine>> {
        let next = self.machine_count().await?;
        let end = u64::try_from(next).map_err(|_| {
            error!(next_machine_id = %next, "machine count out of range");
            MachinaError::chain_decode(format!("nextMachineId out of range: {next}"))
        })?;
        let start = self.first_machine_id;
        if end <= start {
            return Ok(Vec::new());
        }
        if end - start > MAX_LISTED_MACHINES {
            error!(
                next_machine_id = end,
                limit = MAX_LISTED_MACHINES,
                "refusing oversized listing"
            );
            return Err(MachinaError::chain_decode(format!(
                "nextMachineId {end} implies more than {MAX_LISTED_MACHINES} machines"
            )));
        }

        let machines = stream::iter(start..end)
            .map(|id| async move {
                let index = MachineIndex::from(id);
                match self.get_machine(index).await {
                    Ok(machine) => machine,
                    Err(err) => {
                        warn!(machine = %index, error = %err, "using placeholder for unreadable machine");
                        Machine::placeholder(index)
                    }
                }
            })
            .buffered(LISTING_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
        Ok(machines)
    }

    pub async fn has_used_machine(&self, index: MachineIndex, user: Address) -> MachinaResult<bool> {
        Ok(self
            .query(
                self.registry,
                IMachineManager::hasUsedMachineCall {
                    machineId: index.as_u256(),
                    user,
                },
            )
            .await?
            .used)
    }

    pub async fn get_token_balance(&self, account: Address) -> MachinaResult<TokenAmount> {
        let token = self.token()?;
        let balance = self
            .query(token, IERC20::balanceOfCall { account })
            .await?
            .balance;
        Ok(TokenAmount::from_base_units(balance))
    }

    pub async fn get_token_allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> MachinaResult<TokenAmount> {
        let token = self.token()?;
        let remaining = self
            .query(token, IERC20::allowanceCall { owner, spender })
            .await?
            .remaining;
        Ok(TokenAmount::from_base_units(remaining))
    }

    pub async fn get_native_balance(&self, account: Address) -> MachinaResult<TokenAmount> {
        let balance = self.chain.native_balance(account).await.map_err(|err| {
            error!(account = %account, error = %err, "native balance read failed");
            MachinaError::chain_rpc(err.to_string())
        })?;
        Ok(TokenAmount::from_base_units(balance))
    }

    fn token(&self) -> MachinaResult<Address> {
        self.payment_token
            .ok_or_else(|| MachinaError::config("contracts.payment_token is not set"))
    }

    async fn query<C>(&self, to: Address, call: C) -> MachinaResult<C::Return>
    where
        C: SolCall + Send,
    {
        let data = call.abi_encode();
        let output = self.chain.call(to, data.into()).await.map_err(|err| {
            error!(function = C::SIGNATURE, to = %to, error = %err, "contract call failed");
            MachinaError::chain_rpc(err.to_string())
        })?;
        C::abi_decode_returns(&output, true).map_err(|err| {
            error!(function = C::SIGNATURE, to = %to, error = %err, "contract return did not match ABI");
            MachinaError::chain_decode(format!("{}: {err}", C::SIGNATURE))
        })
    }
}
