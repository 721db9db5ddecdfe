//! Sipro register mnemonics: `vb`, `vn`, `vq`, `vd` or `va` followed by a
//! decimal index, each bound to a fixed block of `%M` memory.

use crate::model::VariableAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Vb,
    Vn,
    Vq,
    Vd,
    Va,
}

impl RegisterKind {
    fn from_letter(c: u8) -> Option<Self> {
        match c.to_ascii_lowercase() {
            b'b' => Some(RegisterKind::Vb),
            b'n' => Some(RegisterKind::Vn),
            b'q' => Some(RegisterKind::Vq),
            b'd' => Some(RegisterKind::Vd),
            b'a' => Some(RegisterKind::Va),
            _ => None,
        }
    }

    pub fn iec_type(self) -> &'static str {
        match self {
            RegisterKind::Vb => "BOOL",
            RegisterKind::Vn => "INT",
            RegisterKind::Vq => "DINT",
            RegisterKind::Vd => "LREAL",
            RegisterKind::Va => "STRING",
        }
    }

    pub fn sub_type(self) -> char {
        match self {
            RegisterKind::Vb | RegisterKind::Va => 'B',
            RegisterKind::Vn => 'W',
            RegisterKind::Vq => 'D',
            RegisterKind::Vd => 'L',
        }
    }

    pub fn base_index(self) -> u16 {
        match self {
            RegisterKind::Vb => 300,
            RegisterKind::Vn => 400,
            RegisterKind::Vq => 500,
            RegisterKind::Vd => 600,
            RegisterKind::Va => 700,
        }
    }
}

/// Decoded register mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub kind: RegisterKind,
    pub index: u16,
}

impl Register {
    /// Decode a token such as `vq1782`; `None` unless the whole token is a
    /// register.
    pub fn parse(token: &str) -> Option<Self> {
        let bytes = token.as_bytes();
        if bytes.len() <= 2 || !matches!(bytes[0], b'v' | b'V') {
            return None;
        }
        let kind = RegisterKind::from_letter(bytes[1])?;
        let digits = &token[2..];
        if !digits.bytes().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let index = digits.parse().ok()?;
        Some(Self { kind, index })
    }

    pub fn iec_type(&self) -> &'static str {
        self.kind.iec_type()
    }

    /// `va` registers hold 80-character strings.
    pub fn string_length(&self) -> Option<usize> {
        (self.kind == RegisterKind::Va).then_some(80)
    }

    pub fn address(&self) -> VariableAddress {
        VariableAddress {
            area: 'M',
            sub_type: self.kind.sub_type(),
            index: self.kind.base_index(),
            sub_index: self.index,
        }
    }
}
