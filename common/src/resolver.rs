use crate::grid::Grid;
use crate::types::{Device, TimeSlot, DEVICE_COUNT};

/// One physical transition for the output driver to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCommand {
    pub device: Device,
    pub on: bool,
}

/// Edge-triggered reconciler between the schedule grid and the relays.
///
/// Tracks the last state actually written to hardware per device, and on
/// each tick emits commands only for devices whose desired state differs.
/// Commands are committed by the caller after the hardware write succeeds;
/// an uncommitted command is re-emitted on the next tick, so a failed write
/// is retried rather than lost.
#[derive(Debug, Clone)]
pub struct Resolver {
    // None until the first successful write after boot; the relays' real
    // state is unknown then, so every device gets driven once.
    applied: [Option<bool>; DEVICE_COUNT],
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            applied: [None; DEVICE_COUNT],
        }
    }
}

impl Resolver {
    /// Desired state for one device at the given slot. No slot (clock not
    /// synced, weekend, outside covered hours) means off for everything:
    /// an untrusted time window never leaves a load energized.
    pub fn desired(grid: &Grid, slot: Option<TimeSlot>, device: Device) -> bool {
        match slot {
            Some(slot) => grid.get(device, slot.day, slot.block),
            None => false,
        }
    }

    /// Computes the transitions needed to bring the hardware in line with
    /// the grid. Devices already at their desired state are left untouched
    /// to avoid relay chatter. Pure; never fails, never blocks.
    pub fn plan(&self, grid: &Grid, slot: Option<TimeSlot>) -> Vec<SwitchCommand> {
        Device::ALL
            .into_iter()
            .filter_map(|device| {
                let on = Self::desired(grid, slot, device);
                if self.applied[device.index()] == Some(on) {
                    None
                } else {
                    Some(SwitchCommand { device, on })
                }
            })
            .collect()
    }

    /// Records a completed hardware write. Only call after the driver
    /// reports success, so `applied` always reflects reality.
    pub fn commit(&mut self, device: Device, on: bool) {
        self.applied[device.index()] = Some(on);
    }

    pub fn applied(&self, device: Device) -> Option<bool> {
        self.applied[device.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Day, HourBlock};
    use pretty_assertions::assert_eq;

    fn settled(resolver: &mut Resolver, grid: &Grid, slot: Option<TimeSlot>) {
        for command in resolver.plan(grid, slot) {
            resolver.commit(command.device, command.on);
        }
    }

    #[test]
    fn first_tick_drives_every_device_once() {
        let resolver = Resolver::default();
        let commands = resolver.plan(&Grid::default(), None);

        assert_eq!(commands.len(), DEVICE_COUNT);
        assert!(commands.iter().all(|command| !command.on));
    }

    #[test]
    fn settled_state_produces_no_commands() {
        let mut resolver = Resolver::default();
        let grid = Grid::default();
        settled(&mut resolver, &grid, None);

        assert_eq!(resolver.plan(&grid, None), vec![]);
    }

    #[test]
    fn schedule_scenario_monday_8to9() {
        let (grid, _) = Grid::from_fields(["pv104-mon-8to9"]);
        let mut resolver = Resolver::default();

        // Monday 08:15: only pv104 comes on.
        let slot = Some(TimeSlot::new(Day::Mon, HourBlock::H8to9));
        settled(&mut resolver, &grid, slot);
        assert_eq!(resolver.applied(Device::Pv104), Some(true));
        assert_eq!(resolver.applied(Device::Pv107), Some(false));

        // Monday 09:15: the block ended, pv104 goes back off.
        let slot = Some(TimeSlot::new(Day::Mon, HourBlock::H9to10));
        let commands = resolver.plan(&grid, slot);
        assert_eq!(
            commands,
            vec![SwitchCommand {
                device: Device::Pv104,
                on: false
            }]
        );
        settled(&mut resolver, &grid, slot);

        // Tuesday 08:15: same hour, different day, stays off.
        let slot = Some(TimeSlot::new(Day::Tue, HourBlock::H8to9));
        assert_eq!(resolver.plan(&grid, slot), vec![]);
    }

    #[test]
    fn no_slot_forces_everything_off_regardless_of_grid() {
        // A grid with every cell on still resolves to all-off on weekends
        // or when the clock cannot be trusted.
        let mut grid = Grid::default();
        for device in Device::ALL {
            for day in Day::ALL {
                for block in HourBlock::ALL {
                    grid.set(device, day, block, true);
                }
            }
        }

        let mut resolver = Resolver::default();
        settled(
            &mut resolver,
            &grid,
            Some(TimeSlot::new(Day::Wed, HourBlock::H12to1)),
        );
        assert_eq!(resolver.applied(Device::Pv119), Some(true));

        let commands = resolver.plan(&grid, None);
        assert_eq!(commands.len(), DEVICE_COUNT);
        assert!(commands.iter().all(|command| !command.on));
    }

    #[test]
    fn identical_schedule_causes_at_most_one_transition() {
        let (grid, _) = Grid::from_fields(["pv147-thurs-2to3"]);
        let slot = Some(TimeSlot::new(Day::Thu, HourBlock::H2to3));
        let mut resolver = Resolver::default();

        settled(&mut resolver, &grid, slot);

        // Re-applying the same field set yields an identical grid; further
        // ticks at the same slot produce no hardware writes.
        let (same_grid, _) = Grid::from_fields(["pv147-thurs-2to3"]);
        assert_eq!(resolver.plan(&same_grid, slot), vec![]);
        assert_eq!(resolver.plan(&same_grid, slot), vec![]);
    }

    #[test]
    fn uncommitted_command_is_retried_next_tick() {
        let (grid, _) = Grid::from_fields(["pv108-fri-4to5"]);
        let slot = Some(TimeSlot::new(Day::Fri, HourBlock::H4to5));
        let mut resolver = Resolver::default();

        // Driver write for pv108 fails: everything else is committed.
        for command in resolver.plan(&grid, slot) {
            if command.device != Device::Pv108 {
                resolver.commit(command.device, command.on);
            }
        }

        // The pending edge is re-emitted, not lost.
        assert_eq!(
            resolver.plan(&grid, slot),
            vec![SwitchCommand {
                device: Device::Pv108,
                on: true
            }]
        );
        assert_eq!(resolver.applied(Device::Pv108), None);
    }
}
