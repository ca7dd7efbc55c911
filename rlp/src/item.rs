use crate::{Decoder, Encoder, Error, Kind};

/// A structural RLP value: nested byte strings and lists.
///
/// `Item` spans the whole encodable universe, so the round-trip laws can be
/// stated on it directly: `decode_item(encode_item(v)) == v` for every value,
/// and `encode_item(decode_item(b)) == b` for every accepted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Bytes(Vec<u8>),
    List(Vec<Item>),
}

/// Encode a structural value.
pub fn encode_item(item: &Item) -> Vec<u8> {
    let mut enc = Encoder::new();
    write_item(&mut enc, item);
    enc.finish()
}

/// Decode a structural value, requiring the input to be fully consumed.
pub fn decode_item(data: &[u8]) -> Result<Item, Error> {
    let mut dec = Decoder::new(data);
    let item = read_item(&mut dec)?;
    if dec.has_more() {
        return Err(Error::InvalidValue("trailing bytes"));
    }
    Ok(item)
}

fn write_item(enc: &mut Encoder, item: &Item) {
    match item {
        Item::Bytes(bytes) => {
            enc.bytes(bytes);
        }
        Item::List(children) => {
            enc.list(|e| {
                for child in children {
                    write_item(e, child);
                }
            });
        }
    }
}

fn read_item(dec: &mut Decoder<'_>) -> Result<Item, Error> {
    match dec.kind()? {
        Kind::Byte | Kind::Bytes => Ok(Item::Bytes(dec.take_bytes()?)),
        Kind::List => {
            dec.enter_list()?;
            let mut children = Vec::new();
            while dec.has_more() {
                children.push(read_item(dec)?);
            }
            dec.exit_list()?;
            Ok(Item::List(children))
        }
    }
}
