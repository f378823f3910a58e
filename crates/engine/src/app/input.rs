#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Confirm,
    Multiplayer,
    Join,
    Leave,
    Back,
    Cancel,
    Retry,
    ReloadSettings,
}

const ACTION_COUNT: usize = 12;

impl InputAction {
    pub const ALL: [InputAction; ACTION_COUNT] = [
        InputAction::MoveUp,
        InputAction::MoveDown,
        InputAction::MoveLeft,
        InputAction::MoveRight,
        InputAction::Confirm,
        InputAction::Multiplayer,
        InputAction::Join,
        InputAction::Leave,
        InputAction::Back,
        InputAction::Cancel,
        InputAction::Retry,
        InputAction::ReloadSettings,
    ];

    const fn index(self) -> usize {
        match self {
            InputAction::MoveUp => 0,
            InputAction::MoveDown => 1,
            InputAction::MoveLeft => 2,
            InputAction::MoveRight => 3,
            InputAction::Confirm => 4,
            InputAction::Multiplayer => 5,
            InputAction::Join => 6,
            InputAction::Leave => 7,
            InputAction::Back => 8,
            InputAction::Cancel => 9,
            InputAction::Retry => 10,
            InputAction::ReloadSettings => 11,
        }
    }
}

/// Held state plus press edges. An edge is raised on the up→down transition
/// and consumed by the next snapshot, so holding a key never repeats it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionStates {
    down: [bool; ACTION_COUNT],
    pressed: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub fn set(&mut self, action: InputAction, is_down: bool) {
        let index = action.index();
        if is_down && !self.down[index] {
            self.pressed[index] = true;
        }
        self.down[index] = is_down;
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }

    pub fn was_pressed(&self, action: InputAction) -> bool {
        self.pressed[action.index()]
    }

    pub(crate) fn take_snapshot(&mut self) -> ActionStates {
        let snapshot = *self;
        self.pressed = [false; ACTION_COUNT];
        snapshot
    }
}

/// Input as seen by one simulation tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSnapshot {
    actions: ActionStates,
    window_width: u32,
    window_height: u32,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(actions: ActionStates, window_width: u32, window_height: u32) -> Self {
        Self {
            actions,
            window_width,
            window_height,
        }
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.actions.is_down(action)
    }

    pub fn pressed(&self, action: InputAction) -> bool {
        self.actions.was_pressed(action)
    }

    pub fn with_action_down(mut self, action: InputAction, is_down: bool) -> Self {
        self.actions.down[action.index()] = is_down;
        self
    }

    pub fn with_pressed(mut self, action: InputAction) -> Self {
        self.actions.pressed[action.index()] = true;
        self
    }

    pub fn with_window_size(mut self, window_size: (u32, u32)) -> Self {
        self.window_width = window_size.0;
        self.window_height = window_size.1;
        self
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }
}
