#![allow(non_camel_case_types)]

use device_descriptor::*;

pub const INTERRUPT_BASE: u16 = 0x210;
pub const FUEL_GAUGE_BASE: u16 = 0x230;
pub const GPADC_BASE: u16 = 0x2C0;

field_enum! {
    /// Coulomb counter conversion mode while the device is active.
    pub enum ActiveMode: u8 {
        Off = 0,
        Periodic = 1,
        Continuous = 2,
    }
}

device! {
    /// FG_REG_00, coulomb counter control
    FgControl(u8, addr = 0x230, default = 0x00) {
        active_mode(pos = 6, width = 2): ActiveMode,
        bat_stable_en(pos = 5, width = 1): Bit,
        dither_en(pos = 4, width = 1): Bit,
        fg_en(pos = 3, width = 1): Bit,
        autoclear(pos = 2, width = 1): Bit,
        cal_en(pos = 1, width = 1): Bit,
        pause(pos = 0, width = 1): Bit,
    }

    /// FG_REG_01..03, 24 bit sample counter, little endian
    FgSampleCounter(u8, addr = 0x231) {
        value(pos = 0, width = 8): u8
    }

    /// FG_REG_04..07, 32 bit signed accumulator, little endian
    FgAccumulator(u8, addr = 0x234) {
        value(pos = 0, width = 8): u8
    }

    /// FG_REG_08..09, 10 bit signed offset
    FgOffset(u8, addr = 0x238) {
        value(pos = 0, width = 8): u8
    }

    /// FG_REG_10..11, 14 bit signed integrator
    FgIntegrator(u8, addr = 0x23A) {
        value(pos = 0, width = 8): u8
    }

    /// FG_REG_20
    FgSleep(u8, addr = 0x244) {
        bat_sleep_status(pos = 6, width = 1): Bit,
        sleep_period(pos = 4, width = 2): u8,
        sleep_exit(pos = 2, width = 2): u8,
        sleep_enter(pos = 0, width = 2): u8,
    }

    GpadcCtrl1(u8, addr = 0x2C0, default = 0x00) {
        current_src_ch3(pos = 4, width = 2): u8,
        current_src_ch0(pos = 2, width = 2): u8,
        bat_removal_det(pos = 1, width = 1): Bit,
        gpadc_force(pos = 0, width = 1): Bit,
    }

    GpadcSwSelect(u8, addr = 0x2CD, default = 0x00) {
        sw_conv_en(pos = 7, width = 1): Bit,
        sw_start_conv0(pos = 4, width = 1): Bit,
        channel(pos = 0, width = 4): u8,
    }

    GpadcSwConv0Lsb(u8, addr = 0x2CE) {
        value(pos = 0, width = 8): u8
    }

    GpadcSwConv0Msb(u8, addr = 0x2CF) {
        value(pos = 0, width = 4): u8
    }

    /// Cleared on read.
    Int3Status(u8, addr = 0x21A) {
        vbus(pos = 7, width = 1): Bit,
        vbus_otg(pos = 6, width = 1): Bit,
        id(pos = 5, width = 1): Bit,
        id_otg(pos = 4, width = 1): Bit,
        gpadc_eoc_rt(pos = 3, width = 1): Bit,
        gpadc_eoc_sw(pos = 2, width = 1): Bit,
        gpadc_auto_1(pos = 1, width = 1): Bit,
        gpadc_auto_0(pos = 0, width = 1): Bit,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registers_sit_at_their_block_offsets() {
        assert_eq!(FgControl::ADDRESS, FUEL_GAUGE_BASE);
        assert_eq!(FgIntegrator::ADDRESS, FUEL_GAUGE_BASE + 0x0A);
        assert_eq!(FgSleep::ADDRESS, FUEL_GAUGE_BASE + 0x14);
        assert_eq!(GpadcSwSelect::ADDRESS, GPADC_BASE + 0x0D);
        assert_eq!(Int3Status::ADDRESS, INTERRUPT_BASE + 0x0A);
    }

    #[test]
    fn software_conversion_request() {
        let reg = GpadcSwSelect::new(|w| {
            w.sw_conv_en()
                .write(Bit::Set)
                .sw_start_conv0()
                .write(Bit::Set)
                .channel()
                .write(6)
        });

        assert_eq!(reg.bits(), 0x96);
    }

    #[test]
    fn end_of_conversion_flag() {
        let reg = Int3Status::from_bits(0x04);

        assert_eq!(reg.gpadc_eoc_sw().read(), Some(Bit::Set));
        assert_eq!(reg.gpadc_eoc_rt().read(), Some(Bit::Cleared));
    }
}
