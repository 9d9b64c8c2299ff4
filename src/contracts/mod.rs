pub mod artifact;

use contender_core::alloy::{rpc::types::Log, sol, sol_types::SolEventInterface};

sol! {
    /// Sender side of the USDC transfer test. Fees are paid in LINK.
    #[sol(all_derives)]
    contract TransferUSDC {
        event UsdcTransferred(
            bytes32 messageId,
            uint64 destinationChainSelector,
            address receiver,
            uint256 amount,
            uint256 ccipFee
        );
        event OwnershipTransferRequested(address indexed from, address indexed to);
        event OwnershipTransferred(address indexed from, address indexed to);

        constructor(address _router, address _link, address _usdcToken);

        function transferUsdc(
            uint64 _destinationChainSelector,
            address _receiver,
            uint256 _iterations,
            uint256 _amount,
            uint64 _gasLimit
        ) external returns (bytes32 messageId);
    }

    /// Swaps the CCIP testnet USDC for Compound's testnet USDC.
    #[sol(all_derives)]
    contract SwapTestnetUSDC {
        constructor(address _usdcToken, address _compoundUsdcToken, address _fauceteer);
    }

    #[sol(all_derives)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);

        function approve(address spender, uint256 value) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }
}

pub use TransferUSDC::TransferUSDCEvents;

/// Name of the event carrying the CCIP message id.
pub const USDC_TRANSFERRED: &str = "UsdcTransferred";

/// A receipt log interpreted against the [`TransferUSDC`] interface.
#[derive(Clone, Debug)]
pub enum SenderLog {
    Decoded {
        name: &'static str,
        event: TransferUSDCEvents,
    },
    /// Emitted by some other contract, or by an event the sender doesn't declare.
    Unrecognized,
}

impl SenderLog {
    pub fn decode(log: &Log) -> Self {
        match TransferUSDCEvents::decode_log(&log.inner) {
            Ok(decoded) => Self::Decoded {
                name: event_name(&decoded.data),
                event: decoded.data,
            },
            Err(_) => Self::Unrecognized,
        }
    }
}

fn event_name(event: &TransferUSDCEvents) -> &'static str {
    match event {
        TransferUSDCEvents::UsdcTransferred(_) => USDC_TRANSFERRED,
        TransferUSDCEvents::OwnershipTransferRequested(_) => "OwnershipTransferRequested",
        TransferUSDCEvents::OwnershipTransferred(_) => "OwnershipTransferred",
    }
}
