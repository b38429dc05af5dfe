use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("unsigned message cannot be verified")]
    Unsigned,
    #[error("payload type {0:?} is not accepted at this stage")]
    RejectedType(spire_types::MessageType),
    #[error("rtu_id {rtu_id} is out of range (max {max})")]
    RtuIdOutOfRange { rtu_id: u32, max: u32 },
    #[error("rtu seq_num must be non-zero")]
    ZeroRtuSeqNum,
    #[error("generator id {id} is out of range (max {max})")]
    GeneratorIdOutOfRange { id: u32, max: u32 },
    #[error("sender {sender} is not the local replica {local}")]
    SenderNotLocal {
        sender: spire_types::ReplicaId,
        local: spire_types::ReplicaId,
    },
    #[error("sender {0} is not a member of the current replica set")]
    SenderNotInReplicaSet(spire_types::ReplicaId),
    #[error("serialization failed: {0}")]
    Codec(#[from] postcard::Error),
    #[error(transparent)]
    Crypto(#[from] spire_crypto::CryptoError),
}
