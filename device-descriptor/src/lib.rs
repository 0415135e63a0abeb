#![no_std]

use core::marker::PhantomData;

pub trait RegisterWidthType: Copy {
    const WIDTH: u8;

    fn from_32(data: u32) -> Self;
    fn to_32(self) -> u32;
}

impl RegisterWidthType for u8 {
    const WIDTH: u8 = 8;

    fn from_32(data: u32) -> Self {
        debug_assert!(data <= u8::MAX as u32);
        data as u8
    }

    fn to_32(self) -> u32 {
        self as u32
    }
}

impl RegisterWidthType for u16 {
    const WIDTH: u8 = 16;

    fn from_32(data: u32) -> Self {
        debug_assert!(data <= u16::MAX as u32);
        data as u16
    }

    fn to_32(self) -> u32 {
        self as u32
    }
}

pub trait Proxy {
    type RegisterWidth: RegisterWidthType;

    fn bits(&self) -> Self::RegisterWidth;
    fn from_bits(bits: Self::RegisterWidth) -> Self;
}

pub trait ReadOnlyRegister: Proxy + Copy {
    /// Register address. Devices with a paged or multi-slave register map carry the page in the
    /// upper byte.
    const ADDRESS: u16;
    const NAME: &'static str;
}

pub trait Register: ReadOnlyRegister {
    type Writer: WriterProxy<RegisterWidth = Self::RegisterWidth>;

    const DEFAULT_VALUE: Self::RegisterWidth;

    fn new(f: impl FnOnce(Self::Writer) -> Self::Writer) -> Self;
    fn modify(self, f: impl FnOnce(Self::Writer) -> Self::Writer) -> Self;
}

pub trait WriterProxy: Proxy {
    fn write_bits(self, bits: Self::RegisterWidth) -> Self;
    fn reset(self) -> Self;
}

pub struct Field<const POS: u8, const WIDTH: u8, DataType, P> {
    _marker: PhantomData<DataType>,
    reg: P,
}

impl<const POS: u8, const WIDTH: u8, DataType, P> Field<POS, WIDTH, DataType, P>
where
    DataType: TryFrom<P::RegisterWidth> + Into<P::RegisterWidth>,
    P: Proxy,
{
    pub const fn new(reg: P) -> Self {
        Field {
            _marker: PhantomData,
            reg,
        }
    }

    const MASK: u32 = (1 << WIDTH) - 1;

    #[inline(always)]
    pub fn read_field_bits(&self) -> P::RegisterWidth {
        P::RegisterWidth::from_32((self.reg.bits().to_32() >> POS as u32) & Self::MASK)
    }

    #[inline(always)]
    pub fn read(&self) -> Option<DataType> {
        DataType::try_from(self.read_field_bits()).ok()
    }
}

impl<const POS: u8, const WIDTH: u8, DataType, P> Field<POS, WIDTH, DataType, P>
where
    DataType: TryFrom<P::RegisterWidth> + Into<P::RegisterWidth>,
    P: WriterProxy,
{
    #[inline(always)]
    fn write_field(data: P::RegisterWidth, value: P::RegisterWidth) -> P::RegisterWidth {
        // make sure value fits into field
        debug_assert!(value.to_32() <= Self::MASK);

        let shifted_mask = Self::MASK << POS;
        let masked_field = data.to_32() & !shifted_mask;

        P::RegisterWidth::from_32(masked_field | ((value.to_32() & Self::MASK) << POS as u32))
    }

    #[inline(always)]
    pub fn write(self, value: DataType) -> P {
        let bits = self.reg.bits();

        self.reg.write_bits(Self::write_field(bits, value.into()))
    }
}

/// Declares a C-like enum usable as a register field type.
#[macro_export]
macro_rules! field_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident: $rwt:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, PartialEq, Eq, Copy, Clone)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl core::convert::TryFrom<$rwt> for $name {
            type Error = $rwt;

            fn try_from(data: $rwt) -> Result<Self, Self::Error> {
                match data {
                    $( $value => Ok(Self::$variant), )+
                    _ => Err(data),
                }
            }
        }

        impl From<$name> for $rwt {
            fn from(data: $name) -> $rwt {
                match data {
                    $( $name::$variant => $value, )+
                }
            }
        }
    };
}

field_enum! {
    /// Generic single bit field.
    pub enum Bit: u8 {
        Cleared = 0,
        Set = 1,
    }
}

impl Bit {
    pub fn is_set(self) -> bool {
        self == Bit::Set
    }
}

impl From<bool> for Bit {
    fn from(value: bool) -> Self {
        if value {
            Bit::Set
        } else {
            Bit::Cleared
        }
    }
}

#[macro_export]
macro_rules! impl_fields {
    ($( $(#[$fmeta:meta])* $field:ident($rwt:ty, pos = $pos:literal, width = $width:literal): $type:ty ),*) => {
        $(
            $(#[$fmeta])*
            #[inline(always)]
            #[allow(non_snake_case)]
            pub fn $field(self) -> $crate::Field<$pos, $width, $type, Self> {
                $crate::Field::new(self)
            }
        )*
    };
}

#[macro_export]
macro_rules! register {
    (
        $(#[$meta:meta])*
        $reg:ident($rwt:ty, addr = $addr:literal, default = $default:literal) {
            $($fields:tt)*
        }
    ) => {
        $crate::register!($(#[$meta])* $reg($rwt, addr = $addr) { $($fields)* });

        impl Default for $reg {
            #[inline(always)]
            fn default() -> Self {
                <Self as $crate::Proxy>::from_bits($default)
            }
        }

        impl $crate::Register for $reg {
            type Writer = writer_proxies::$reg;

            const DEFAULT_VALUE: $rwt = $default;

            #[inline(always)]
            fn new(f: impl FnOnce(Self::Writer) -> Self::Writer) -> Self {
                let writer = <Self::Writer as $crate::Proxy>::from_bits($default);
                <Self as $crate::Proxy>::from_bits($crate::Proxy::bits(&f(writer)))
            }

            #[inline(always)]
            fn modify(self, f: impl FnOnce(Self::Writer) -> Self::Writer) -> Self {
                let writer = <Self::Writer as $crate::Proxy>::from_bits(self.value);
                <Self as $crate::Proxy>::from_bits($crate::Proxy::bits(&f(writer)))
            }
        }
    };

    (
        $(#[$meta:meta])*
        $reg:ident($rwt:ty, addr = $addr:literal) {
            $( $(#[$fmeta:meta])* $field:ident(pos = $pos:literal, width = $width:literal): $type:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        #[must_use]
        #[allow(non_camel_case_types)]
        pub struct $reg {
            value: $rwt
        }

        impl $crate::Proxy for $reg {
            type RegisterWidth = $rwt;

            #[inline(always)]
            fn from_bits(bits: $rwt) -> Self {
                Self { value: bits }
            }

            #[inline(always)]
            fn bits(&self) -> $rwt {
                self.value
            }
        }

        impl $crate::ReadOnlyRegister for $reg {
            const ADDRESS: u16 = $addr;
            const NAME: &'static str = stringify!($reg);
        }

        impl $reg {
            $crate::impl_fields! { $( $(#[$fmeta])* $field($rwt, pos = $pos, width = $width): $type ),* }
        }
    };
}

#[macro_export]
macro_rules! writer_proxy {
    (
        $reg:ident($rwt:ty, addr = $addr:literal, default = $default:literal) {
            $( $(#[$fmeta:meta])* $field:ident(pos = $pos:literal, width = $width:literal): $type:ty ),* $(,)?
        }
    ) => {
        #[allow(non_camel_case_types)]
        pub struct $reg {
            bits: $rwt
        }

        impl $crate::Proxy for $reg {
            type RegisterWidth = $rwt;

            #[inline(always)]
            fn from_bits(bits: $rwt) -> Self {
                Self { bits }
            }

            #[inline(always)]
            fn bits(&self) -> $rwt {
                self.bits
            }
        }

        impl $crate::WriterProxy for $reg {
            #[inline(always)]
            fn write_bits(self, bits: $rwt) -> Self {
                <Self as $crate::Proxy>::from_bits(bits)
            }

            #[inline(always)]
            fn reset(self) -> Self {
                <Self as $crate::WriterProxy>::write_bits(self, $default)
            }
        }

        impl $reg {
            $crate::impl_fields! { $( $(#[$fmeta])* $field($rwt, pos = $pos, width = $width): $type ),* }
        }
    };

    // Read-only registers have no writer.
    ($reg:ident($rwt:ty, addr = $addr:literal) { $($fields:tt)* }) => {};
}

#[macro_export]
macro_rules! device {
    (
        $(
            $(#[$meta:meta])*
            $reg:ident($($proto:tt)*) {
                $($fields:tt)*
            }
        )+
    ) => {
        pub mod writer_proxies {
            #[allow(unused_imports)]
            use super::*;

            $(
                $crate::writer_proxy!($reg($($proto)*) { $($fields)* });
            )+
        }

        $(
            $crate::register!($(#[$meta])* $reg($($proto)*) { $($fields)* });
        )+
    };
}
