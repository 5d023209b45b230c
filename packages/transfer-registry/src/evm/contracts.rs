//! Contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings for both
//! registries. Both inherit `Ownable` and `Versionable`.

use alloy::sol;

sol! {
    /// Transfer lifecycle registry
    #[sol(rpc)]
    contract PaymentManager {
        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);
        event PendingTransfer(address indexed signer, uint64 indexed nonce, bytes32 indexed txHash);
        event TxSuccess(bytes32 indexed local, bytes32 indexed foreign);
        event TxFailed(bytes32 indexed local, bytes32 indexed foreign);
        event Retry(bytes32 indexed txHash);

        function owner() external view returns (address);
        function isOwner() external view returns (bool);
        function version() external view returns (string);
        function renounceOwnership() external;
        function transferOwnership(address newOwner) external;

        /// Record lookup by local hash. `state` is the TransferState discriminant.
        function transfers(bytes32 txHash) external view returns (
            bytes32 hash,
            address signer,
            uint64 nonce,
            uint8 state
        );

        function submitPending(address signer, uint64 nonce, bytes32 local, bytes32 foreign) external;
        function submitSuccess(bytes32 local, bytes32 foreign) external;
        function submitFailed(bytes32 local, bytes32 foreign) external;
        function requestRetry(bytes32 txHash) external;
    }
}

sol! {
    /// Write-once mirror of registered transfers
    #[sol(rpc)]
    contract RemoteBridge {
        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);
        /// `nonce` is not indexed
        event TransferRegistered(bytes32 indexed hash, address indexed signer, uint64 nonce);

        function owner() external view returns (address);
        function isOwner() external view returns (bool);
        function version() external view returns (string);
        function renounceOwnership() external;
        function transferOwnership(address newOwner) external;

        function transfers(bytes32 local) external view returns (
            bytes32 hash,
            address signer,
            uint64 nonce,
            bool exist
        );

        function getLastBlock() external view returns (uint256);
        function setLastBlock(uint256 lastBlock) external;
        function register(bytes32 local, bytes32 remote, address signer, uint64 nonce) external;
        function update(bytes32 local, bytes32 remote) external;
    }
}
