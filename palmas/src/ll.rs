use device_descriptor::{ReadOnlyRegister, Register};
use embedded_hal_async::i2c::{I2c as AsyncI2c, Operation};
use register_access::AsyncRegisterAccess;

/// Register location on the multi-slave I2C bus.
///
/// Register addresses carry the block base in the upper byte. Block `0x1xx` lives on the
/// primary slave, `0x2xx` on the next one, and so on.
///
/// ```rust
/// # use palmas::ll::Address;
/// let address = Address::new(0x230, 0x0A);
///
/// assert_eq!(address.slave, 1);
/// assert_eq!(address.register, 0x3A);
/// assert_eq!(address.i2c_address(0x58), 0x59);
/// assert_eq!(Address::from_register(0x23A), address);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address {
    pub slave: u8,
    pub register: u8,
}

impl Address {
    pub const fn new(base: u16, offset: u8) -> Self {
        Self {
            slave: ((base >> 8) as u8).wrapping_sub(1),
            register: (base as u8).wrapping_add(offset),
        }
    }

    pub const fn from_register(address: u16) -> Self {
        Self::new(address, 0)
    }

    pub const fn i2c_address(self, primary: u8) -> u8 {
        primary.wrapping_add(self.slave)
    }
}

pub struct PalmasI2cInterface<I> {
    pub i2c: I,
    pub primary_address: u8,
}

impl<I> PalmasI2cInterface<I> {
    pub const DEFAULT_PRIMARY_ADDRESS: u8 = 0x58;

    pub const fn new(i2c: I) -> Self {
        Self {
            i2c,
            primary_address: Self::DEFAULT_PRIMARY_ADDRESS,
        }
    }

    fn locate(&self, register: u16) -> (u8, u8) {
        let address = Address::from_register(register);
        (address.i2c_address(self.primary_address), address.register)
    }
}

impl<I> AsyncRegisterAccess<u8> for PalmasI2cInterface<I>
where
    I: AsyncI2c,
{
    type Error = I::Error;

    async fn read_register_async<R>(&mut self) -> Result<R, Self::Error>
    where
        R: ReadOnlyRegister<RegisterWidth = u8>,
    {
        let mut buffer = [0];
        self.read_sequential_async::<R>(&mut buffer).await?;

        Ok(R::from_bits(buffer[0]))
    }

    async fn write_register_async<R>(&mut self, reg: R) -> Result<(), Self::Error>
    where
        R: Register<RegisterWidth = u8>,
    {
        self.write_sequential_async::<R>(&[reg.bits()]).await
    }

    async fn read_sequential_async<R>(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>
    where
        R: ReadOnlyRegister<RegisterWidth = u8>,
    {
        let (device, register) = self.locate(R::ADDRESS);
        self.i2c
            .transaction(
                device,
                &mut [Operation::Write(&[register]), Operation::Read(buffer)],
            )
            .await
    }

    async fn write_sequential_async<R>(&mut self, bytes: &[u8]) -> Result<(), Self::Error>
    where
        R: Register<RegisterWidth = u8>,
    {
        let (device, register) = self.locate(R::ADDRESS);
        self.i2c
            .transaction(
                device,
                &mut [Operation::Write(&[register]), Operation::Write(bytes)],
            )
            .await
    }
}
