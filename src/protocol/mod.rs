//! Binary codecs for handlers that parse or build messages on accepted
//! connections and datagrams. The dispatch runtime itself never looks at
//! payload bytes.

pub use binary::{BinaryReader, BinaryWriter, ByteOrder, MAX_VARINT_LEN};

mod binary;
