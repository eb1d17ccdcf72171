//! Call and event bindings for the contracts the orchestrator drives.
//!
//! The multisig is a Gnosis-style `MultiSigWallet`, proxies expose
//! `getImplementation`/`setImplementation`, the modules registry is the
//! staking `ModulesProxy`, and proposals go to a `GovernorAlpha`.
use alloy_sol_types::sol;

sol! {
    interface IMultiSigWallet {
        event Submission(uint256 indexed transactionId);
        event Confirmation(address indexed sender, uint256 indexed transactionId);
        event Revocation(address indexed sender, uint256 indexed transactionId);
        event Execution(uint256 indexed transactionId);
        event ExecutionFailure(uint256 indexed transactionId);

        function submitTransaction(address destination, uint256 value, bytes data) external returns (uint256 transactionId);
        function confirmTransaction(uint256 transactionId) external;
        function revokeConfirmation(uint256 transactionId) external;
        function executeTransaction(uint256 transactionId) external;
        function transactions(uint256 transactionId) external view returns (address destination, uint256 value, bytes data, bool executed);
        function getConfirmationCount(uint256 transactionId) external view returns (uint256 count);
        function getConfirmations(uint256 transactionId) external view returns (address[] confirmations);
        function isOwner(address owner) external view returns (bool);
        function addOwner(address owner) external;
        function removeOwner(address owner) external;
        function required() external view returns (uint256);
    }

    interface ICustomProxy {
        function getImplementation() external view returns (address implementation);
        function setImplementation(address implementation) external;
    }

    interface IModulesProxyRegistry {
        function checkClashingFuncSelectors(address newModule) external view returns (address[] clashingModules, bytes4[] clashingModulesFuncSelectors, bytes4[] clashingProxyRegistryFuncSelectors);
        function addModule(address newModule) external;
        function replaceModule(address oldModule, address newModule) external;
    }

    interface IGovernorAlpha {
        event ProposalCreated(uint256 id, address proposer, address[] targets, uint256[] values, string[] signatures, bytes[] calldatas, uint256 startBlock, uint256 endBlock, string description);

        function propose(address[] targets, uint256[] values, string[] signatures, bytes[] calldatas, string description) external returns (uint256);
    }
}

/// Human-readable form of the multisig submission event, decoded from receipts.
pub const SUBMISSION_EVENT: &str = "event Submission(uint256 indexed transactionId)";

/// Human-readable form of the governor proposal event, decoded from receipts.
pub const PROPOSAL_CREATED_EVENT: &str = "event ProposalCreated(uint256 id, address proposer, address[] targets, uint256[] values, string[] signatures, bytes[] calldatas, uint256 startBlock, uint256 endBlock, string description)";
