use crate::header::be_u32;
use crate::{FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_NOP, FDT_PROP, FdtError};
use kexec_addresses::tag_align;

/// One token of the structure block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    BeginNode(&'a [u8]),
    EndNode,
    Prop { name_offset: usize, value: &'a [u8] },
    Nop,
    End,
}

/// Size of a `FDT_PROP` token header (tag, length, name offset).
pub(crate) const PROP_HEADER_SIZE: usize = 12;

/// Decode the token at `offset` of `block` and return it together with the
/// offset of the following token.
pub(crate) fn token_at(block: &[u8], offset: usize) -> Result<(Token<'_>, usize), FdtError> {
    let bad = || FdtError::BadStructure { offset };
    let tag = be_u32(block, offset).ok_or_else(bad)?;

    let (token, next) = match tag {
        FDT_BEGIN_NODE => {
            let name = block.get(offset + 4..).ok_or_else(bad)?;
            let len = name.iter().position(|&b| b == 0).ok_or_else(bad)?;
            (Token::BeginNode(&name[..len]), offset + 4 + tag_align(len + 1))
        }
        FDT_PROP => {
            let len = be_u32(block, offset + 4).ok_or_else(bad)? as usize;
            let name_offset = be_u32(block, offset + 8).ok_or_else(bad)? as usize;
            let start = offset + PROP_HEADER_SIZE;
            let value = start
                .checked_add(len)
                .and_then(|end| block.get(start..end))
                .ok_or_else(bad)?;
            (Token::Prop { name_offset, value }, start + tag_align(len))
        }
        FDT_END_NODE => (Token::EndNode, offset + 4),
        FDT_NOP => (Token::Nop, offset + 4),
        FDT_END => (Token::End, offset + 4),
        _ => return Err(bad()),
    };

    if next > block.len() {
        return Err(bad());
    }
    Ok((token, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn words(cells: &[u32]) -> Vec<u8> {
        cells.iter().flat_map(|c| c.to_be_bytes()).collect()
    }

    #[test]
    fn begin_node_name_is_tag_aligned() {
        let mut block = words(&[FDT_BEGIN_NODE]);
        block.extend_from_slice(b"chosen\0\0");
        block.extend_from_slice(&words(&[FDT_END_NODE]));

        let (token, next) = token_at(&block, 0).unwrap();
        assert_eq!(token, Token::BeginNode(b"chosen"));
        assert_eq!(next, 12);
        assert_eq!(token_at(&block, next).unwrap(), (Token::EndNode, 16));
    }

    #[test]
    fn property_value_is_sliced() {
        let mut block = words(&[FDT_PROP, 3, 7]);
        block.extend_from_slice(b"ab\0\0");
        let (token, next) = token_at(&block, 0).unwrap();
        assert_eq!(
            token,
            Token::Prop {
                name_offset: 7,
                value: b"ab\0"
            }
        );
        assert_eq!(next, 16);
    }

    #[test]
    fn overlong_property_is_malformed() {
        let block = words(&[FDT_PROP, 64, 0]);
        assert_eq!(
            token_at(&block, 0),
            Err(FdtError::BadStructure { offset: 0 })
        );
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let block = words(&[FDT_NOP, 0x77]);
        assert_eq!(token_at(&block, 0).unwrap(), (Token::Nop, 4));
        assert_eq!(
            token_at(&block, 4),
            Err(FdtError::BadStructure { offset: 4 })
        );
    }
}
