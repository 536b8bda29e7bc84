//! Constant-pool entries.
//!
//! Only values with a source-literal form live in the pool; the
//! singleton values (`undefined`, `null`, booleans, small integers)
//! have dedicated load opcodes.

use num_bigint::BigInt;

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Number literal
    Number(f64),
    /// String literal
    String(String),
    /// BigInt literal
    BigInt(BigInt),
}

impl Constant {
    /// Serialize into `buf` (tag byte + payload, little-endian).
    pub fn write(&self, buf: &mut Vec<u8>) {
        match self {
            Constant::Number(n) => {
                buf.push(0);
                buf.extend_from_slice(&n.to_le_bytes());
            }
            Constant::String(s) => {
                buf.push(1);
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Constant::BigInt(n) => {
                let (sign, bytes) = n.to_bytes_le();
                buf.push(2);
                buf.push(match sign {
                    num_bigint::Sign::Minus => 0,
                    _ => 1,
                });
                buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(&bytes);
            }
        }
    }

    /// Deserialize from `buf` at `at`; returns the constant and the
    /// next offset.
    pub fn read(buf: &[u8], at: usize) -> Result<(Self, usize), String> {
        let tag = *buf.get(at).ok_or("truncated constant")?;
        let mut at = at + 1;
        match tag {
            0 => {
                let bytes: [u8; 8] = buf
                    .get(at..at + 8)
                    .ok_or("truncated number constant")?
                    .try_into()
                    .unwrap();
                Ok((Constant::Number(f64::from_le_bytes(bytes)), at + 8))
            }
            1 => {
                let len = read_u32(buf, at)? as usize;
                at += 4;
                let s = std::str::from_utf8(buf.get(at..at + len).ok_or("truncated string constant")?)
                    .map_err(|e| format!("invalid utf-8 in constant: {}", e))?;
                Ok((Constant::String(s.to_string()), at + len))
            }
            2 => {
                let sign = if *buf.get(at).ok_or("truncated bigint constant")? == 0 {
                    num_bigint::Sign::Minus
                } else {
                    num_bigint::Sign::Plus
                };
                at += 1;
                let len = read_u32(buf, at)? as usize;
                at += 4;
                let bytes = buf.get(at..at + len).ok_or("truncated bigint constant")?;
                Ok((Constant::BigInt(BigInt::from_bytes_le(sign, bytes)), at + len))
            }
            _ => Err(format!("unknown constant tag {}", tag)),
        }
    }
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32, String> {
    let bytes: [u8; 4] = buf
        .get(at..at + 4)
        .ok_or("truncated length")?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_roundtrip() {
        let cases = vec![
            Constant::Number(3.5),
            Constant::Number(-0.0),
            Constant::String("hello".to_string()),
            Constant::BigInt(BigInt::from(-123456789i64)),
        ];
        let mut buf = Vec::new();
        for c in &cases {
            c.write(&mut buf);
        }
        let mut at = 0;
        for c in &cases {
            let (got, next) = Constant::read(&buf, at).unwrap();
            // compare bit patterns for numbers so -0.0 survives
            match (&got, c) {
                (Constant::Number(a), Constant::Number(b)) => {
                    assert_eq!(a.to_bits(), b.to_bits())
                }
                _ => assert_eq!(&got, c),
            }
            at = next;
        }
        assert_eq!(at, buf.len());
    }
}
