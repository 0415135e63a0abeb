#![no_std]
#![allow(async_fn_in_trait)]

use device_descriptor::{ReadOnlyRegister, Register, RegisterWidthType};

pub trait AsyncRegisterReader: ReadOnlyRegister {
    async fn read_async<E>(
        iface: &mut impl AsyncRegisterAccess<Self::RegisterWidth, Error = E>,
    ) -> Result<Self, E>;
}

pub trait AsyncRegisterWriter: Register {
    async fn write_async<E>(
        self,
        iface: &mut impl AsyncRegisterAccess<Self::RegisterWidth, Error = E>,
    ) -> Result<(), E>;
}

impl<T: ReadOnlyRegister> AsyncRegisterReader for T {
    async fn read_async<E>(
        iface: &mut impl AsyncRegisterAccess<T::RegisterWidth, Error = E>,
    ) -> Result<Self, E> {
        iface.read_register_async::<T>().await
    }
}

impl<T: Register> AsyncRegisterWriter for T {
    async fn write_async<E>(
        self,
        iface: &mut impl AsyncRegisterAccess<T::RegisterWidth, Error = E>,
    ) -> Result<(), E> {
        iface.write_register_async(self).await
    }
}

/// Register level access to a device.
///
/// `read_sequential_async` and `write_sequential_async` transfer a block of consecutive
/// registers starting at `R`, for multi-byte values that must be read or written in one
/// transaction.
pub trait AsyncRegisterAccess<RWT>
where
    RWT: RegisterWidthType,
{
    type Error;

    async fn read_register_async<R>(&mut self) -> Result<R, Self::Error>
    where
        R: ReadOnlyRegister<RegisterWidth = RWT>;
    async fn write_register_async<R>(&mut self, reg: R) -> Result<(), Self::Error>
    where
        R: Register<RegisterWidth = RWT>;

    async fn read_sequential_async<R>(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>
    where
        R: ReadOnlyRegister<RegisterWidth = RWT>;
    async fn write_sequential_async<R>(&mut self, bytes: &[u8]) -> Result<(), Self::Error>
    where
        R: Register<RegisterWidth = RWT>;

    /// Read-modify-write of a single register. Returns the value that was written.
    async fn modify_register_async<R>(
        &mut self,
        f: impl FnOnce(R::Writer) -> R::Writer,
    ) -> Result<R, Self::Error>
    where
        R: Register<RegisterWidth = RWT>,
    {
        let current = self.read_register_async::<R>().await?;
        let updated = current.modify(f);
        self.write_register_async(updated).await?;
        Ok(updated)
    }
}
