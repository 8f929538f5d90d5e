//! Solidity interface definitions for the registry and the payment token.
//!
//! Two registry bindings share the `getMachine(uint256)` selector and differ
//! only in how the return value is laid out on the wire. Which one applies to
//! a deployment is pinned by [`machina_core::MachineEncoding`].

use alloy_sol_types::sol;

sol! {
    /// MachineManager registry, struct-returning accessor.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IMachineManager {
        struct MachineInfo {
            string name;
            address machineAddr;
            uint256 price;
            uint16 platformFeeBps;
            bool exists;
        }

        function getMachine(uint256 machineId) external view returns (MachineInfo memory info);
        function nextMachineId() external view returns (uint256 nextId);
        function hasUsedMachine(uint256 machineId, address user) external view returns (bool used);
        function useMachine(uint256 machineId) external payable;
    }
}

sol! {
    /// MachineManager registry, positional accessor (earlier deployments).
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IMachineManagerTuple {
        function getMachine(uint256 machineId) external view returns (
            string memory name,
            address machineAddr,
            uint256 price,
            uint16 platformFeeBps,
            bool exists
        );
    }
}

sol! {
    /// Minimal ERC-20 surface used for payment and airdrops.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 value) external returns (bool success);
        function transfer(address to, uint256 value) external returns (bool success);
    }
}
